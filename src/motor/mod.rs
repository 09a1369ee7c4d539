// Motors, fans, servo outputs and atomizers.

pub mod fan;
pub mod fm8118;
pub mod pca9685;
pub mod servo;
pub mod vibration;

pub use fan::FanPwm;
pub use fm8118::Fm8118;
pub use pca9685::Pca9685;
pub use servo::{ServoConfig, ServoController, ServoKind};
pub use vibration::VibrationMotor;
