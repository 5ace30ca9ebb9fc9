use actix_cors::Cors;
use actix_multipart::Multipart;
use actix_web::{HttpResponse, http::header, web};
use futures::TryStreamExt;
use log::info;
use shared::{AnalysisResponse, HealthResponse};

use crate::analysis::AnalysisPipeline;
use crate::error::AnalysisFailure;
use crate::models::UploadedImage;

const SERVICE_NAME: &str = "AI Trading Analyzer API";
const FILE_FIELD: &str = "file";

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/").route(web::get().to(health)))
        .service(web::resource("/api/upload").route(web::post().to(upload_chart)));
}

pub fn build_cors(allowed_origins: &[String], allow_any: bool) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec!["GET", "POST", "OPTIONS"])
        .allowed_headers(vec![header::AUTHORIZATION, header::ACCEPT, header::CONTENT_TYPE])
        .max_age(3600);
    if allow_any {
        return cors.allow_any_origin();
    }
    allowed_origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(HealthResponse {
        status: "online".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn upload_chart(
    pipeline: web::Data<AnalysisPipeline>,
    mut payload: Multipart,
) -> Result<HttpResponse, AnalysisFailure> {
    let upload = read_upload(&mut payload, pipeline.max_upload_bytes()).await?;
    info!(
        "Received {} ({}, {} bytes)",
        upload.filename, upload.content_type, upload.byte_length
    );

    // Dropping this future on client disconnect also drops the outbound model call.
    let result = pipeline.run(upload).await?;
    Ok(HttpResponse::Ok().json(AnalysisResponse::from(result)))
}

/// Reads the `file` field once. Buffering stops one chunk past `limit` so the
/// validator sees the overflow without the rest of the body being read.
async fn read_upload(
    payload: &mut Multipart,
    limit: usize,
) -> Result<UploadedImage, AnalysisFailure> {
    let malformed = |e: actix_multipart::MultipartError| {
        AnalysisFailure::invalid_input(format!("Malformed multipart body: {}", e))
    };

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        if field.name() != Some(FILE_FIELD) {
            while field.try_next().await.map_err(malformed)?.is_some() {}
            continue;
        }

        let filename = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AnalysisFailure::invalid_input("Uploaded file has no filename"))?;
        let content_type = field
            .content_type()
            .map(|mime| mime.essence_str().to_string())
            .unwrap_or_default();

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            bytes.extend_from_slice(&chunk);
            if bytes.len() > limit {
                break;
            }
        }
        return Ok(UploadedImage::new(bytes, content_type, filename));
    }

    Err(AnalysisFailure::invalid_input(
        "No file uploaded. Send the chart as a multipart field named \"file\".",
    ))
}
