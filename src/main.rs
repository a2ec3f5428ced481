use std::{error::Error, sync::Arc};

use tokio::{fs, net, task};
use tower_http::services::ServeDir;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use helpdesk::{
    db,
    notify::{HttpSink, Notifier},
    server::{self, AppState},
    Config,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = fs::read_to_string("config.toml").await?;
    let config = toml::from_str::<Config>(&config)?;

    let (db_client, db_connection) = db::connect(config.db).await?;

    task::spawn(async move {
        if let Err(e) = db_connection.await {
            panic!("database connection failed: {e}");
        }
    });

    db_client.init_schema().await?;

    let notifier = match config.notifier {
        Some(notifier) => Notifier::spawn(HttpSink::new(notifier)),
        None => {
            tracing::warn!(
                "task-routing endpoint not configured, \
                 ticket notifications are disabled",
            );
            Notifier::disabled()
        }
    };

    let cors = server::cors_layer(&config.http.cors.allowed_origins)?;

    let app = server::router(Arc::new(AppState {
        store: Arc::new(db_client),
        notifier,
        partners: config.partners,
    }))
    .layer(cors)
    .fallback_service(ServeDir::new("static"));

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
