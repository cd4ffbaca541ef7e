use std::env;
use std::ffi::OsStr;

/// Guard that temporarily sets an environment variable and restores the previous value on drop.
///
/// Modifying the environment is unsynchronized with respect to other threads; tests using
/// this guard should be serialized.
///
/// # Examples
///
/// ```no_run
/// use utils::EnvVarGuard;
///
/// let _guard = EnvVarGuard::set("ASSET_CACHE_DISK_MAX_BYTES", "10mb");
/// // When _guard is dropped, the previous value (or absence) is restored
/// ```
pub struct EnvVarGuard {
    key: &'static str,
    prev: Option<String>,
}

impl EnvVarGuard {
    pub fn set(key: &'static str, value: impl AsRef<OsStr>) -> Self {
        let prev = env::var(key).ok();
        unsafe {
            env::set_var(key, value);
        }
        Self { key, prev }
    }

    pub fn remove(key: &'static str) -> Self {
        let prev = env::var(key).ok();
        unsafe {
            env::remove_var(key);
        }
        Self { key, prev }
    }
}

impl Drop for EnvVarGuard {
    fn drop(&mut self) {
        if let Some(v) = &self.prev {
            unsafe {
                env::set_var(self.key, v);
            }
        } else {
            unsafe {
                env::remove_var(self.key);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;

    use super::*;

    #[test]
    #[serial(env)]
    fn test_restores_previous_value() {
        const KEY: &str = "ASSET_CACHE_GUARD_TEST";
        unsafe {
            env::set_var(KEY, "before");
        }
        {
            let _g = EnvVarGuard::set(KEY, "during");
            assert_eq!(env::var(KEY).unwrap(), "during");
        }
        assert_eq!(env::var(KEY).unwrap(), "before");

        {
            let _g = EnvVarGuard::remove(KEY);
            assert!(env::var(KEY).is_err());
        }
        assert_eq!(env::var(KEY).unwrap(), "before");

        unsafe {
            env::remove_var(KEY);
        }
        {
            let _g = EnvVarGuard::set(KEY, "temp");
        }
        assert!(env::var(KEY).is_err());
    }
}
