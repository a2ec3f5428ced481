use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{
        header::{InvalidHeaderValue, CONTENT_TYPE, REFERER},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use derive_more::From;
use serde::Deserialize;
use time::OffsetDateTime;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::{
    api, config,
    db::{self, TicketStore},
    notify::{self, Notifier},
};

pub type SharedAppState = Arc<AppState>;

pub struct AppState {
    pub store: Arc<dyn TicketStore>,

    pub notifier: Notifier,

    pub partners: Vec<config::Partner>,
}

pub fn router(state: SharedAppState) -> Router {
    Router::new()
        .route("/tickets", get(list_tickets).post(add_ticket))
        .route("/tickets/:id", get(get_ticket).patch(edit_ticket))
        .with_state(state)
}

/// Allow-list CORS layer. The whole list goes into a single `AllowOrigin`
/// so every configured origin is matched and echoed; repeated
/// `allow_origin` calls would keep only the last one.
pub fn cors_layer(
    allowed_origins: &[String],
) -> Result<CorsLayer, InvalidHeaderValue> {
    let origins = allowed_origins
        .iter()
        .map(|origin| origin.parse::<HeaderValue>())
        .collect::<Result<Vec<_>, _>>()?;

    Ok(CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([CONTENT_TYPE])
        .allow_origin(AllowOrigin::list(origins)))
}

fn error_response(code: StatusCode, message: &str) -> Response {
    (
        code,
        Json(api::ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTicketInput {
    title: Option<String>,
    description: Option<String>,
    customer_name: Option<String>,
    customer_phone: Option<String>,
}

async fn add_ticket(
    State(state): State<SharedAppState>,
    headers: HeaderMap,
    payload: Result<Json<AddTicketInput>, JsonRejection>,
) -> Result<(StatusCode, Json<api::Ticket>), AddTicketError> {
    use AddTicketError as E;

    let Json(input) = payload.map_err(|_| E::InvalidBody)?;
    let (title, description, customer_name, customer_phone) = match input {
        AddTicketInput {
            title: Some(title),
            description: Some(description),
            customer_name: Some(customer_name),
            customer_phone: Some(customer_phone),
        } if !title.is_empty()
            && !description.is_empty()
            && !customer_name.is_empty()
            && !customer_phone.is_empty() =>
        {
            (title, description, customer_name, customer_phone)
        }
        _ => return Err(E::MissingFields),
    };

    let ticket = state
        .store
        .insert_ticket(db::NewTicket {
            title,
            description,
            customer_name,
            customer_phone,
        })
        .await?;

    // The response never waits for (or learns about) routing dispatch.
    let referer = headers.get(REFERER).and_then(|v| v.to_str().ok());
    state.notifier.send(notify::Notification {
        ticket_id: ticket.id,
        title: ticket.title.clone(),
        description: ticket.description.clone(),
        customer_name: ticket.customer_name.clone(),
        customer_phone: ticket.customer_phone.clone(),
        origin: notify::origin(&state.partners, referer),
        channel: notify::CHANNEL,
        priority: notify::Priority::for_content(
            &ticket.title,
            &ticket.description,
        ),
        timestamp: OffsetDateTime::now_utc(),
    });

    Ok((StatusCode::CREATED, Json(ticket.into())))
}

#[derive(Debug, From)]
pub enum AddTicketError {
    #[from]
    DbError(db::Error),
    InvalidBody,
    MissingFields,
}

impl IntoResponse for AddTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidBody => error_response(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
            ),
            Self::MissingFields => error_response(
                StatusCode::BAD_REQUEST,
                "Missing required fields",
            ),
            Self::DbError(e) => {
                tracing::error!("failed to create ticket: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to create ticket",
                )
            }
        }
    }
}

#[derive(Deserialize)]
struct ListTicketsInput {
    name: Option<String>,
    phone: Option<String>,
}

async fn list_tickets(
    State(state): State<SharedAppState>,
    Query(ListTicketsInput { name, phone }): Query<ListTicketsInput>,
) -> Result<Json<Vec<api::Ticket>>, ListTicketsError> {
    let tickets = state
        .store
        .get_tickets(name.as_deref(), phone.as_deref())
        .await?;

    Ok(Json(tickets.into_iter().map(Into::into).collect()))
}

#[derive(Debug, From)]
pub enum ListTicketsError {
    #[from]
    DbError(db::Error),
}

impl IntoResponse for ListTicketsError {
    fn into_response(self) -> Response {
        match self {
            Self::DbError(e) => {
                tracing::error!("failed to fetch tickets: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to fetch tickets",
                )
            }
        }
    }
}

async fn get_ticket(
    State(state): State<SharedAppState>,
    Path(id): Path<api::ticket::Id>,
) -> Result<Json<api::Ticket>, GetTicketError> {
    use GetTicketError as E;

    let ticket = state
        .store
        .get_ticket_by_id(id)
        .await?
        .ok_or(E::TicketNotFound)?;

    Ok(Json(ticket.into()))
}

#[derive(Debug, From)]
pub enum GetTicketError {
    #[from]
    DbError(db::Error),
    TicketNotFound,
}

impl IntoResponse for GetTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::TicketNotFound => error_response(
                StatusCode::NOT_FOUND,
                "Ticket not found",
            ),
            Self::DbError(e) => {
                tracing::error!("failed to fetch ticket: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to fetch ticket",
                )
            }
        }
    }
}

#[derive(Deserialize)]
struct EditTicketInput {
    status: Option<String>,
    notes: Option<String>,
}

async fn edit_ticket(
    State(state): State<SharedAppState>,
    Path(id): Path<api::ticket::Id>,
    payload: Result<Json<EditTicketInput>, JsonRejection>,
) -> Result<Json<api::Ticket>, EditTicketError> {
    use EditTicketError as E;

    let Json(input) = payload.map_err(|_| E::InvalidBody)?;

    // One mutation per request keeps `updatedAt` unambiguous.
    let ticket = match (input.status, input.notes) {
        (Some(_), Some(_)) => return Err(E::StatusAndNotes),
        (None, None) => return Err(E::StatusOrNotesRequired),
        (Some(status), None) => {
            let status =
                status.parse().map_err(|_| E::InvalidStatus)?;
            state.store.update_ticket_status(id, status).await?
        }
        (None, Some(notes)) => {
            state.store.update_ticket_notes(id, &notes).await?
        }
    };

    let ticket = ticket.ok_or(E::TicketNotFound)?;
    Ok(Json(ticket.into()))
}

#[derive(Debug, From)]
pub enum EditTicketError {
    #[from]
    DbError(db::Error),
    InvalidBody,
    InvalidStatus,
    StatusAndNotes,
    StatusOrNotesRequired,
    TicketNotFound,
}

impl IntoResponse for EditTicketError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidBody => error_response(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
            ),
            Self::InvalidStatus => error_response(
                StatusCode::BAD_REQUEST,
                "Invalid status value",
            ),
            Self::StatusAndNotes => error_response(
                StatusCode::BAD_REQUEST,
                "Cannot update both status and notes",
            ),
            Self::StatusOrNotesRequired => error_response(
                StatusCode::BAD_REQUEST,
                "Either status or notes is required",
            ),
            Self::TicketNotFound => error_response(
                StatusCode::NOT_FOUND,
                "Ticket not found",
            ),
            Self::DbError(e) => {
                tracing::error!("failed to update ticket: {e}");
                error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to update ticket",
                )
            }
        }
    }
}
