// Clocks, bus plumbing, supervisors and speech output that fit no other
// category.

pub mod datetime;
pub mod ds1232;
pub mod ds1302;
pub mod ds1307;
pub mod pca9546;
pub mod snr9816;

pub use datetime::DateTime;
pub use ds1232::Ds1232;
pub use ds1302::Ds1302;
pub use ds1307::Ds1307;
pub use pca9546::{Pca9546, SharedI2c};
pub use snr9816::Snr9816;
