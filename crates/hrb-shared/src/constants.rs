/// Length of a blob identifier in hex characters.
///
/// Blobs are addressed by the hex digest of their content (20 bytes). The
/// intent parser relies on this length alone to tell a trailing blob id from
/// a trailing collection path segment, so a collection whose last path
/// segment is exactly this long cannot be addressed unambiguously.
pub const BLOB_ID_LEN: usize = 40;

/// Size of a blob identifier in raw bytes
pub const BLOB_ID_BYTES: usize = BLOB_ID_LEN / 2;

/// Display name of the unnamed collection
pub const DEFAULT_COLLECTION_LABEL: &str = "(default album)";

/// Number of entries shown on one page of a collection
pub const IMAGES_PER_PAGE: usize = 100;

/// Query parameter carrying the session authentication token
pub const QUERY_AUTH: &str = "auth";

/// Query parameter asking the store for a JSON document instead of a page
pub const QUERY_JSON: &str = "json";

/// Query parameter selecting a rendition of a blob
pub const QUERY_RENDITION: &str = "rendition";

/// Response header carrying the reference of a newly created resource
pub const HEADER_LOCATION: &str = "location";

/// Content type of mutation bodies
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
