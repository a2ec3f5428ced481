pub mod ticket;

use async_trait::async_trait;
use tokio_postgres::{tls::NoTlsStream, NoTls, Socket};

use crate::config;

pub use tokio_postgres::Error;

pub use self::ticket::{NewTicket, Ticket};

pub type Connection = tokio_postgres::Connection<Socket, NoTlsStream>;

pub async fn connect(
    config: config::Db,
) -> Result<(Client, Connection), Error> {
    tokio_postgres::connect(&config.url, NoTls)
        .await
        .map(|(client, connection)| (Client(client), connection))
}

pub struct Client(tokio_postgres::Client);

/// Persistence operations over the `tickets` relation.
///
/// Handlers depend on this trait rather than on a concrete client, so tests
/// can substitute an in-memory store.
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Inserts a new ticket with status forced to `Open` and empty notes,
    /// returning the persisted row including the generated id and
    /// timestamps.
    async fn insert_ticket(&self, new: NewTicket) -> Result<Ticket, Error>;

    async fn get_ticket_by_id(
        &self,
        id: ticket::Id,
    ) -> Result<Option<Ticket>, Error>;

    /// Lists tickets ordered by creation time, newest first. Supplied
    /// filters match case-insensitively on substrings and are ANDed.
    async fn get_tickets(
        &self,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<Ticket>, Error>;

    /// Returns `None` when the id is unknown.
    async fn update_ticket_status(
        &self,
        id: ticket::Id,
        status: ticket::Status,
    ) -> Result<Option<Ticket>, Error>;

    /// Overwrites (not appends) the notes field. Returns `None` when the id
    /// is unknown.
    async fn update_ticket_notes(
        &self,
        id: ticket::Id,
        notes: &str,
    ) -> Result<Option<Ticket>, Error>;
}
