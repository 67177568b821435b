pub mod logging;
pub mod throttle;

pub use self::throttle::Throttle;
