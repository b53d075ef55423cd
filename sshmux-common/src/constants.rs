//! Defaults shared by the library, the CLI and the tests.

/// Default SSH port when the config omits `Port`.
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Default configuration file, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "./config.json";

/// Originator address reported in `direct-tcpip` channel requests.
pub const CHANNEL_ORIGINATOR_HOST: &str = "127.0.0.1";

/// Originator port reported in `direct-tcpip` channel requests.
pub const CHANNEL_ORIGINATOR_PORT: u32 = 0;
