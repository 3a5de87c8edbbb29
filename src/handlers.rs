use crate::config::ConfigUpdate;
use crate::error::BrowseError;
use crate::server::Server;
use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use serde::Deserialize;

fn default_session() -> String {
    "default".to_string()
}

fn first_page() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default = "default_session")]
    session: String,
    /// Absent: stay in the folder the session has open
    prefix: Option<String>,
    #[serde(default = "first_page")]
    page: u32,
    #[serde(default)]
    refresh: bool,
}

#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    #[serde(default = "default_session")]
    session: String,
    key: String,
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    key: String,
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .route("/list", web::get().to(handle_list))
            .route("/preview", web::get().to(handle_preview))
            .route("/download", web::get().to(handle_download))
            .route("/config", web::get().to(handle_get_config))
            .route("/config", web::post().to(handle_update_config))
            .route("/session/{id}", web::delete().to(handle_end_session)),
    );
}

pub async fn handle_list(
    query: web::Query<ListQuery>,
    server: web::Data<Server>,
) -> Result<HttpResponse, BrowseError> {
    let page = match (&query.prefix, query.refresh) {
        (Some(prefix), true) => server.refresh(&query.session, prefix, query.page).await?,
        (Some(prefix), false) => server.browse(&query.session, prefix, query.page).await?,
        (None, _) => server.turn_page(&query.session, query.page).await?,
    };
    Ok(HttpResponse::Ok().json(page))
}

pub async fn handle_preview(
    query: web::Query<PreviewQuery>,
    server: web::Data<Server>,
) -> Result<HttpResponse, BrowseError> {
    if query.key.is_empty() {
        return Err(BrowseError::BadRequest("file key is required".into()));
    }
    let preview = server.preview(&query.session, &query.key, query.size).await?;
    Ok(HttpResponse::Ok().json(preview))
}

pub async fn handle_download(
    query: web::Query<DownloadQuery>,
    server: web::Data<Server>,
) -> Result<HttpResponse, BrowseError> {
    let name = query.key.rsplit('/').next().unwrap_or_default();
    if name.is_empty() {
        return Err(BrowseError::BadRequest("file key is required".into()));
    }

    let body = server.download(&query.key).await?;
    Ok(HttpResponse::Ok()
        .content_type("application/octet-stream")
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(name.to_string())],
        })
        .streaming(body))
}

pub async fn handle_get_config(server: web::Data<Server>) -> HttpResponse {
    HttpResponse::Ok().json(server.config())
}

pub async fn handle_update_config(
    update: web::Json<ConfigUpdate>,
    server: web::Data<Server>,
) -> Result<HttpResponse, BrowseError> {
    let config = server.update_config(update.into_inner())?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Configuration updated successfully",
        "status": "success",
        "config": config,
    })))
}

pub async fn handle_end_session(
    id: web::Path<String>,
    server: web::Data<Server>,
) -> HttpResponse {
    if server.end_session(&id) {
        HttpResponse::NoContent().finish()
    } else {
        HttpResponse::NotFound().finish()
    }
}
