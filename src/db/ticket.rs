use std::{error::Error as StdError, str::FromStr};

use async_trait::async_trait;
use derive_more::Display;
use enum_utils::TryFromRepr;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio_postgres::{
    types::{
        accepts, private::BytesMut, to_sql_checked, FromSql, IsNull, ToSql,
        Type,
    },
    Error, Row,
};

use super::{Client, TicketStore};

#[derive(Clone, Debug)]
pub struct Ticket {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub status: Status,
    pub notes: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields supplied by the caller at creation time. Everything else is
/// assigned server-side.
#[derive(Clone, Debug)]
pub struct NewTicket {
    pub title: String,
    pub description: String,
    pub customer_name: String,
    pub customer_phone: String,
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Id(i64);

impl From<i64> for Id {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl FromSql<'_> for Id {
    accepts!(INT8);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        i64::from_sql(ty, raw).map(Self)
    }
}

impl ToSql for Id {
    accepts!(INT8);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        self.0.to_sql(ty, out)
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Display,
    Eq,
    PartialEq,
    Serialize,
    TryFromRepr,
)]
#[repr(u8)]
pub enum Status {
    /// Freshly created, awaiting an agent.
    Open = 1,

    /// An agent is working on the ticket.
    #[display("In Progress")]
    #[serde(rename = "In Progress")]
    InProgress = 2,

    /// Resolved. Nothing prevents reopening later.
    Closed = 3,
}

#[derive(Clone, Copy, Debug, Display, derive_more::Error)]
#[display("invalid status value")]
pub struct InvalidStatus;

impl FromStr for Status {
    type Err = InvalidStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Open" => Ok(Self::Open),
            "In Progress" => Ok(Self::InProgress),
            "Closed" => Ok(Self::Closed),
            _ => Err(InvalidStatus),
        }
    }
}

impl FromSql<'_> for Status {
    accepts!(INT2);

    fn from_sql(
        ty: &Type,
        raw: &[u8],
    ) -> Result<Self, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from_sql(ty, raw)?;
        let repr = u8::try_from(repr)?;
        let status = Self::try_from(repr).map_err(|_| "invalid status")?;
        Ok(status)
    }
}

impl ToSql for Status {
    accepts!(INT2);

    to_sql_checked!();

    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn StdError + Sync + Send>> {
        let repr = i16::from((*self) as u8);
        repr.to_sql(ty, out)
    }
}

impl Client {
    /// Creates the `tickets` table if it doesn't exist yet. The separate
    /// `ALTER TABLE` migrates tables created before the notes column was
    /// introduced and is a no-op against an up-to-date table.
    pub async fn init_schema(&self) -> Result<(), Error> {
        const SQL: &str = "\
            CREATE TABLE IF NOT EXISTS tickets (\
                id BIGSERIAL PRIMARY KEY, \
                title TEXT NOT NULL, \
                description TEXT NOT NULL, \
                customer_name TEXT NOT NULL, \
                customer_phone TEXT NOT NULL, \
                status SMALLINT NOT NULL DEFAULT 1, \
                notes TEXT NOT NULL DEFAULT '', \
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(), \
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now()\
            ); \
            ALTER TABLE tickets \
                ADD COLUMN IF NOT EXISTS notes TEXT NOT NULL DEFAULT ''";
        self.0.batch_execute(SQL).await
    }
}

fn ticket_from_row(row: &Row) -> Ticket {
    Ticket {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        customer_name: row.get("customer_name"),
        customer_phone: row.get("customer_phone"),
        status: row.get("status"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

#[async_trait]
impl TicketStore for Client {
    async fn insert_ticket(&self, new: NewTicket) -> Result<Ticket, Error> {
        const SQL: &str = "\
            INSERT INTO tickets (title, description, \
                                 customer_name, customer_phone, \
                                 status, notes) \
            VALUES ($1, $2, $3, $4, $5, '') \
            RETURNING id, title, description, \
                      customer_name, customer_phone, \
                      status, notes, created_at, updated_at";
        self.0
            .query_one(
                SQL,
                &[
                    &new.title,
                    &new.description,
                    &new.customer_name,
                    &new.customer_phone,
                    &Status::Open,
                ],
            )
            .await
            .map(|row| ticket_from_row(&row))
    }

    async fn get_ticket_by_id(
        &self,
        id: Id,
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, title, description, \
                   customer_name, customer_phone, \
                   status, notes, created_at, updated_at \
            FROM tickets \
            WHERE id = $1";
        Ok(self
            .0
            .query_opt(SQL, &[&id])
            .await?
            .map(|row| ticket_from_row(&row)))
    }

    async fn get_tickets(
        &self,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<Ticket>, Error> {
        const SQL: &str = "\
            SELECT id, title, description, \
                   customer_name, customer_phone, \
                   status, notes, created_at, updated_at \
            FROM tickets \
            WHERE ($1::TEXT IS NULL \
                   OR customer_name ILIKE '%' || $1 || '%') \
              AND ($2::TEXT IS NULL \
                   OR customer_phone ILIKE '%' || $2 || '%') \
            ORDER BY created_at DESC, \
                     id DESC";
        Ok(self
            .0
            .query(SQL, &[&name, &phone])
            .await?
            .iter()
            .map(ticket_from_row)
            .collect())
    }

    async fn update_ticket_status(
        &self,
        id: Id,
        status: Status,
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET status = $2, \
                updated_at = now() \
            WHERE id = $1 \
            RETURNING id, title, description, \
                      customer_name, customer_phone, \
                      status, notes, created_at, updated_at";
        Ok(self
            .0
            .query_opt(SQL, &[&id, &status])
            .await?
            .map(|row| ticket_from_row(&row)))
    }

    async fn update_ticket_notes(
        &self,
        id: Id,
        notes: &str,
    ) -> Result<Option<Ticket>, Error> {
        const SQL: &str = "\
            UPDATE tickets \
            SET notes = $2, \
                updated_at = now() \
            WHERE id = $1 \
            RETURNING id, title, description, \
                      customer_name, customer_phone, \
                      status, notes, created_at, updated_at";
        Ok(self
            .0
            .query_opt(SQL, &[&id, &notes])
            .await?
            .map(|row| ticket_from_row(&row)))
    }
}
