use std::str::FromStr;

use tracing::{info, warn};

use crate::ByteSize;

/// Prefix for every environment variable read through [`config_group!`](crate::config_group).
pub const ENV_PREFIX: &str = "ASSET_CACHE";

/// A trait to control how a value is parsed from an environment string or other config source
/// if it's present.
pub trait ParsableConfigValue: std::fmt::Debug + Sized {
    fn parse_user_value(value: &str) -> Option<Self>;

    /// Parse the value, returning the default if it can't be parsed or the string is empty.
    /// Issue a warning if it can't be parsed.
    fn parse(variable_name: &str, value: Option<String>, default: Self) -> Self {
        match value {
            Some(v) => match Self::parse_user_value(&v) {
                Some(v) => {
                    info!("Config: {variable_name} = {v:?} (user set)");
                    v
                },
                None => {
                    warn!(
                        "Configuration value {v} for {variable_name} cannot be parsed into correct type; reverting to default."
                    );
                    info!("Config: {variable_name} = {default:?} (default due to parse error)");
                    default
                },
            },
            None => default,
        }
    }
}

/// Most values work with the FromStr implementation, but we want to override the behavior for some types
/// (e.g. Option<T> and bool) to have custom parsing behavior.
pub trait FromStrParseable: FromStr + std::fmt::Debug {}

impl<T: FromStrParseable> ParsableConfigValue for T {
    fn parse_user_value(value: &str) -> Option<Self> {
        value.trim().parse::<T>().ok()
    }
}

impl FromStrParseable for usize {}
impl FromStrParseable for u32 {}
impl FromStrParseable for u64 {}
impl FromStrParseable for f64 {}
impl FromStrParseable for String {}
impl FromStrParseable for ByteSize {}

/// Special handling for bool:
/// - true: "1","true","yes","y","on"  -> true
/// - false: "0","false","no","n","off" -> false
fn parse_bool_value(value: &str) -> Option<bool> {
    let t = value.trim().to_ascii_lowercase();

    match t.as_str() {
        "0" | "false" | "no" | "n" | "off" => Some(false),
        "1" | "true" | "yes" | "y" | "on" => Some(true),
        _ => None,
    }
}

impl ParsableConfigValue for bool {
    fn parse_user_value(value: &str) -> Option<Self> {
        parse_bool_value(value)
    }
}

/// Enable Option<T> to allow the default value to be None if nothing is set and appear as
/// Some(Value) if the user specifies the value.
impl<T: ParsableConfigValue> ParsableConfigValue for Option<T> {
    fn parse_user_value(value: &str) -> Option<Self> {
        T::parse_user_value(value).map(Some)
    }
}

/// Builds the environment variable name for a field of a configuration group,
/// e.g. `("disk", "max_bytes")` -> `ASSET_CACHE_DISK_MAX_BYTES`.
pub fn env_var_name(group_name: &str, field_name: &str) -> String {
    format!("{ENV_PREFIX}_{}_{}", group_name.to_uppercase(), field_name.to_uppercase())
}

/// Macro to create a configuration value group struct.
///
/// Usage (inside a module named after the group, e.g. `config::disk`):
/// ```rust
/// mod disk {
///     utils::config_group!({
///         /// Total byte budget.
///         ref max_bytes: u64 = 1024;
///         ref extension: String = "jpg".to_string();
///     });
/// }
///
/// let values = disk::ConfigValueGroup::new();
/// assert_eq!(values.max_bytes, 1024);
/// ```
///
/// This creates a `ConfigValueGroup` struct with the specified fields. `new()` / `default()`
/// give the defaults; `apply_env_overrides()` reads `ASSET_CACHE_<GROUP>_<FIELD>` for every field,
/// where the group is the last segment of the calling module path.
#[macro_export]
macro_rules! config_group {
    ({
        $(
            $(#[$meta:meta])*
            ref $name:ident : $type:ty = $value:expr;
        )+
    }) => {
        #[allow(unused_imports)]
        use $crate::configuration_utils::ParsableConfigValue;

        /// ConfigValueGroup struct containing all configurable values
        #[derive(Debug, Clone, PartialEq)]
        pub struct ConfigValueGroup {
            $(
                $(#[$meta])*
                pub $name: $type,
            )+
        }

        impl Default for ConfigValueGroup {
            fn default() -> Self {
                Self {
                    $(
                        $name: {
                            let v: $type = $value;
                            v
                        },
                    )+
                }
            }
        }

        impl ConfigValueGroup {
            /// Create a new instance with default values only (no environment variable overrides).
            pub fn new() -> Self {
                Self::default()
            }

            /// Name of the group, taken from the enclosing module.
            pub fn group_name() -> &'static str {
                module_path!().rsplit("::").next().unwrap_or("unknown")
            }

            /// Create a new instance with environment variable overrides applied.
            pub fn from_env() -> Self {
                let mut values = Self::default();
                values.apply_env_overrides();
                values
            }

            /// Apply environment variable overrides to this configuration group.
            pub fn apply_env_overrides(&mut self) {
                $(
                    let env_var_name = $crate::configuration_utils::env_var_name(Self::group_name(), stringify!($name));
                    let maybe_env_value = std::env::var(&env_var_name).ok();
                    let current = std::mem::replace(&mut self.$name, { let v: $type = $value; v });
                    self.$name = <$type>::parse(&env_var_name, maybe_env_value, current);
                )+
            }
        }
    };
}
