//! Protocol constants and defaults.

/// Marker written once at the start of every connection to select BSON framing.
pub const WIRE_MAGIC: &[u8] = b"BSON\n";

/// Default analysis host address.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default analysis host port (the result server's usual port).
pub const DEFAULT_PORT: u16 = 2042;

/// Lookup index reserved for the process-registration record.
pub const PROCESS_LOOKUP_INDEX: u32 = 0;

/// First lookup index handed out to regular APIs.
pub const FIRST_API_LOOKUP_INDEX: u32 = 1;

/// API name of the process-registration record.
pub const PROCESS_API_NAME: &str = "__process__";

/// Argument labels of the process-registration record.
pub const PROCESS_ARG_LABELS: [&str; 7] = [
    "is_success",
    "retval",
    "TimeLow",
    "TimeHigh",
    "ProcessIdentifier",
    "ParentProcessIdentifier",
    "ModulePath",
];

/// Labels that prefix every API's argument list.
pub const FIXED_ARG_LABELS: [&str; 2] = ["is_success", "retval"];

/// Value of the `type` field in description records.
pub const DESCRIPTION_TYPE: &str = "info";

/// Category reported for every API.
pub const DEFAULT_CATEGORY: &str = "unknown";

/// Parent pid reported when the event source does not announce one.
pub const PLACEHOLDER_PARENT_PID: u32 = 1;

/// Module path reported when the event source does not announce one.
pub const PLACEHOLDER_MODULE_PATH: &str = "dummy";

/// Largest document accepted on the wire, in bytes.
pub const MAX_DOCUMENT_SIZE: usize = 16 * 1024 * 1024;

/// Environment variable overriding the host address in the CLI.
pub const ENV_HOST: &str = "HOSTLINK_HOST";

/// Environment variable overriding the host port in the CLI.
pub const ENV_PORT: &str = "HOSTLINK_PORT";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "hostlink";
