pub mod byte_size;
pub use byte_size::ByteSize;

pub mod configuration_utils;

mod guards;
pub use guards::EnvVarGuard;

pub mod singleflight;
