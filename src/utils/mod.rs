pub mod clock;
pub mod dir;
pub mod logging;
pub mod rate;
pub mod runtime;
pub mod time;
