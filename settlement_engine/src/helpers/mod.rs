mod business_days;
mod references;

pub use business_days::*;
pub use references::*;
