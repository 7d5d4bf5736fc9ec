use std::time::Duration;

/// Heartbeat sent by the client.
pub const PING: &str = "__ping__";

/// Heartbeat echo sent by the server.
pub const PONG: &str = "__pong__";

/// Prefix of the report-ready control message. The remainder is the
/// report identifier.
pub const REPORT_PATH_PREFIX: &str = "REPORT_PATH=";

/// Form field the report endpoint reads the identifier from.
pub const REPORT_FORM_FIELD: &str = "REPORT_PATH";

/// Query parameter carrying the session token on the stream upgrade.
pub const TOKEN_QUERY_PARAM: &str = "temp_access_token";

/// Exchanges a bearer credential for a session token.
pub const AUTHORIZE_PATH: &str = "/authorize";

/// Serves a generated report file.
pub const REPORT_PATH: &str = "/report";

/// Wakes an idle server. Unauthenticated.
pub const AWAKEN_PATH: &str = "/awaken";

/// Lists generated reports.
pub const SEARCH_PATH: &str = "/search";

/// Serves every generated report as one zip archive.
pub const RETRIEVE_ALL_PATH: &str = "/retrieve_all";

/// Duplex stream endpoint.
pub const STREAM_PATH: &str = "/stream";

/// Content type of a fetched report.
pub const REPORT_CONTENT_TYPE: &str = "text/csv";

/// Content type of the bulk report archive.
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// File name used for the bulk report archive.
pub const ARCHIVE_FILENAME: &str = "reports_collection.zip";

/// Fallback file name when none can be derived from a report identifier.
pub const DEFAULT_REPORT_FILENAME: &str = "report.csv";

/// How often the client sends [`PING`].
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);

/// How long the client waits for [`PONG`] after a [`PING`].
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Delay before a reconnection attempt after the stream closes.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Maximum inbound message size in bytes (16 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;
