// LEDs and displays.

pub mod led_bar;
pub mod piranha;
pub mod power_led;
pub mod ssd1306;
pub mod tm1637;
pub mod uv_matrix;

pub use led_bar::LedBar;
pub use piranha::{PiranhaLed, Polarity};
pub use power_led::PowerLed;
pub use ssd1306::Ssd1306;
pub use tm1637::Tm1637;
pub use uv_matrix::UvMatrix;
