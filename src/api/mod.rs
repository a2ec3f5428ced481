pub mod ticket;

use serde::{Deserialize, Serialize};

pub use self::ticket::Ticket;

/// Body of every non-2xx response. The message is intentionally generic for
/// 5xx responses; detail stays in the server logs.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct ErrorBody {
    pub error: String,
}
