// Signal acquisition and generation: ADC, DAC, digital potentiometers,
// clock synthesis.

pub mod ads1115;
pub mod ds3502;
pub mod mcp41010;
pub mod mcp4725;
pub mod si5351;

pub use ads1115::{Ads1115, Channel, Gain, Rate};
pub use ds3502::{Ds3502, WiperMode};
pub use mcp41010::Mcp41010;
pub use mcp4725::{Mcp4725, Mcp4725Status, PowerDown};
pub use si5351::Si5351;
