use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use helpdesk::{
    api,
    config::Partner,
    db::{self, TicketStore},
    notify::{self, Notifier, Sink},
    server::{self, AppState},
};
use reqwest::StatusCode;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::{net::TcpListener, sync::mpsc, task};

/// In-memory [`TicketStore`] mirroring the SQL semantics: sequential ids,
/// newest-first ordering, case-insensitive substring filters.
#[derive(Default)]
pub struct MemStore {
    tickets: Mutex<Vec<db::Ticket>>,
    next_id: AtomicI64,
}

#[async_trait]
impl TicketStore for MemStore {
    async fn insert_ticket(
        &self,
        new: db::NewTicket,
    ) -> Result<db::Ticket, db::Error> {
        let now = OffsetDateTime::now_utc();
        let ticket = db::Ticket {
            id: (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).into(),
            title: new.title,
            description: new.description,
            customer_name: new.customer_name,
            customer_phone: new.customer_phone,
            status: api::ticket::Status::Open,
            notes: String::new(),
            created_at: now,
            updated_at: now,
        };
        self.tickets.lock().unwrap().push(ticket.clone());
        Ok(ticket)
    }

    async fn get_ticket_by_id(
        &self,
        id: api::ticket::Id,
    ) -> Result<Option<db::Ticket>, db::Error> {
        Ok(self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == id)
            .cloned())
    }

    async fn get_tickets(
        &self,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<db::Ticket>, db::Error> {
        let name = name.map(str::to_lowercase);
        let phone = phone.map(str::to_lowercase);
        let mut tickets = self
            .tickets
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                name.as_ref().map_or(true, |n| {
                    t.customer_name.to_lowercase().contains(n)
                }) && phone.as_ref().map_or(true, |p| {
                    t.customer_phone.to_lowercase().contains(p)
                })
            })
            .cloned()
            .collect::<Vec<_>>();
        tickets.sort_by(|a, b| {
            (b.created_at, b.id).cmp(&(a.created_at, a.id))
        });
        Ok(tickets)
    }

    async fn update_ticket_status(
        &self,
        id: api::ticket::Id,
        status: api::ticket::Status,
    ) -> Result<Option<db::Ticket>, db::Error> {
        Ok(self.tickets.lock().unwrap().iter_mut().find(|t| t.id == id).map(
            |t| {
                t.status = status;
                t.updated_at = OffsetDateTime::now_utc();
                t.clone()
            },
        ))
    }

    async fn update_ticket_notes(
        &self,
        id: api::ticket::Id,
        notes: &str,
    ) -> Result<Option<db::Ticket>, db::Error> {
        Ok(self.tickets.lock().unwrap().iter_mut().find(|t| t.id == id).map(
            |t| {
                t.notes = notes.into();
                t.updated_at = OffsetDateTime::now_utc();
                t.clone()
            },
        ))
    }
}

/// Sink that forwards every delivered notification to the test instead of
/// an external service.
pub struct CaptureSink(pub mpsc::UnboundedSender<notify::Notification>);

#[async_trait]
impl Sink for CaptureSink {
    async fn deliver(
        &self,
        notification: &notify::Notification,
    ) -> Result<(), notify::Error> {
        self.0
            .send(notification.clone())
            .map_err(|_| notify::Error::Closed)
    }
}

pub fn partners() -> Vec<Partner> {
    vec![
        Partner {
            domain: "nss.example.com".into(),
            tag: "NSS".into(),
        },
        Partner {
            domain: "hhovv.example.com".into(),
            tag: "HHOVV".into(),
        },
    ]
}

fn state_with_notifier(notifier: Notifier) -> server::SharedAppState {
    Arc::new(AppState {
        store: Arc::new(MemStore::default()),
        notifier,
        partners: partners(),
    })
}

async fn serve(app: axum::Router) -> Client {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    task::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    Client {
        inner: reqwest::Client::new(),
        base_url: format!("http://{addr}"),
    }
}

/// Serves the app on an ephemeral port with an in-memory store and the
/// given notifier.
pub async fn spawn_with_notifier(notifier: Notifier) -> Client {
    serve(server::router(state_with_notifier(notifier))).await
}

/// App behind the production CORS layer built from the given allow-list.
pub async fn spawn_with_cors(allowed_origins: &[String]) -> Client {
    let app = server::router(state_with_notifier(Notifier::disabled()))
        .layer(server::cors_layer(allowed_origins).unwrap());
    serve(app).await
}

/// App plus a channel observing everything the dispatcher delivers.
pub async fn spawn() -> (Client, mpsc::UnboundedReceiver<notify::Notification>)
{
    let (tx, rx) = mpsc::unbounded_channel();
    let client = spawn_with_notifier(Notifier::spawn(CaptureSink(tx))).await;
    (client, rx)
}

pub struct Client {
    inner: reqwest::Client,
    pub base_url: String,
}

impl Client {
    pub async fn add_ticket(
        &self,
        title: &str,
        description: &str,
        customer_name: &str,
        customer_phone: &str,
    ) -> Result<api::Ticket, StatusCode> {
        self.add_ticket_from(
            title,
            description,
            customer_name,
            customer_phone,
            None,
        )
        .await
    }

    pub async fn add_ticket_from(
        &self,
        title: &str,
        description: &str,
        customer_name: &str,
        customer_phone: &str,
        referer: Option<&str>,
    ) -> Result<api::Ticket, StatusCode> {
        let mut req = self.inner.post(format!("{}/tickets", self.base_url));
        if let Some(referer) = referer {
            req = req.header("Referer", referer);
        }
        let resp = req
            .json(&json!({
                "title": title,
                "description": description,
                "customerName": customer_name,
                "customerPhone": customer_phone,
            }))
            .send()
            .await
            .expect("failed to send a request");
        if resp.status() != StatusCode::CREATED {
            return Err(resp.status());
        }
        Ok(resp
            .json::<api::Ticket>()
            .await
            .expect("failed to get a response"))
    }

    /// Raw body POST, for malformed and incomplete payloads.
    pub async fn add_ticket_raw(&self, body: &Value) -> StatusCode {
        self.inner
            .post(format!("{}/tickets", self.base_url))
            .json(body)
            .send()
            .await
            .expect("failed to send a request")
            .status()
    }

    pub async fn get_ticket(
        &self,
        id: api::ticket::Id,
    ) -> Result<api::Ticket, StatusCode> {
        self.inner
            .get(format!("{}/tickets/{id}", self.base_url))
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::Ticket>()
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub async fn list_tickets(
        &self,
        name: Option<&str>,
        phone: Option<&str>,
    ) -> Result<Vec<api::Ticket>, StatusCode> {
        let mut req = self.inner.get(format!("{}/tickets", self.base_url));
        if let Some(name) = name {
            req = req.query(&[("name", name)]);
        }
        if let Some(phone) = phone {
            req = req.query(&[("phone", phone)]);
        }
        req.send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<Vec<api::Ticket>>()
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }

    pub async fn edit_ticket(
        &self,
        id: api::ticket::Id,
        body: &Value,
    ) -> Result<api::Ticket, StatusCode> {
        self.inner
            .patch(format!("{}/tickets/{id}", self.base_url))
            .json(body)
            .send()
            .await
            .expect("failed to send a request")
            .error_for_status()
            .map_err(|e| e.status().expect("status error"))?
            .json::<api::Ticket>()
            .await
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
    }
}
