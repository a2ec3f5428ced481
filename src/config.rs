use std::net;

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub db: Db,
    pub http: Http,
    pub notifier: Option<Notifier>,
    #[serde(default)]
    pub partners: Vec<Partner>,
}

#[derive(Deserialize)]
pub struct Db {
    pub url: String,
}

#[derive(Deserialize)]
pub struct Http {
    pub server: Server,
    pub cors: Cors,
}

#[derive(Deserialize)]
pub struct Server {
    pub addr: net::SocketAddr,
}

#[derive(Deserialize)]
pub struct Cors {
    pub allowed_origins: Vec<String>,
}

/// Credentials and endpoint of the external task-routing service.
///
/// Absent section disables outbound notifications entirely.
#[derive(Deserialize)]
pub struct Notifier {
    pub endpoint: String,
    pub account_sid: String,
    pub auth_token: String,
}

/// A known partner site whose referring address maps to an origin tag.
#[derive(Clone, Debug, Deserialize)]
pub struct Partner {
    pub domain: String,
    pub tag: String,
}
