//! HTTP surface for the img2img function.

use actix_web::{
    http::{Method, StatusCode},
    middleware::DefaultHeaders,
    web, App, HttpRequest, HttpResponse, HttpServer,
};
use serde_json::json;

use crate::{
    error::StudioError,
    models::{ErrorBody, Img2ImgRequest},
    studio::GenerationService,
};

pub const ALLOW_ORIGIN: &str = "*";
pub const ALLOW_HEADERS: &str = "authorization, x-client-info, apikey, content-type";

pub struct AppState {
    pub service: GenerationService,
}

pub fn cors_headers() -> DefaultHeaders {
    DefaultHeaders::new()
        .add(("Access-Control-Allow-Origin", ALLOW_ORIGIN))
        .add(("Access-Control-Allow-Headers", ALLOW_HEADERS))
}

/// Registers every route. Kept separate from [`serve`] so tests can mount it.
pub fn configure(cfg: &mut web::ServiceConfig) {
    for path in ["/generate-img2img", "/functions/v1/generate-img2img"] {
        cfg.service(
            web::resource(path)
                .route(web::post().to(generate_img2img))
                .route(web::method(Method::OPTIONS).to(preflight)),
        );
    }
    cfg.service(web::resource("/health").route(web::get().to(health)));
}

fn error_response(err: &StudioError) -> HttpResponse {
    if err.is_client_error() {
        HttpResponse::BadRequest().json(ErrorBody {
            error: err.message().to_string(),
            success: None,
        })
    } else {
        HttpResponse::InternalServerError().json(ErrorBody {
            error: err.message().to_string(),
            success: Some(false),
        })
    }
}

async fn generate_img2img(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let request: Img2ImgRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            log::warn!("⚠️  Rejected malformed body: {}", e);
            return error_response(&StudioError::ValidationError(format!(
                "Invalid JSON body: {}",
                e
            )));
        }
    };

    match state.service.generate(&request).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => {
            if e.is_client_error() {
                log::warn!("⚠️  {}", e);
            } else {
                log::error!("❌ Error in generate-img2img function: {}", e);
            }
            error_response(&e)
        }
    }
}

async fn preflight() -> HttpResponse {
    HttpResponse::Ok().body("ok")
}

async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "status": "ok" }))
}

async fn fallback(req: HttpRequest) -> HttpResponse {
    if req.method() == Method::OPTIONS {
        return preflight().await;
    }
    HttpResponse::build(StatusCode::NOT_FOUND).json(ErrorBody {
        error: format!("No route for {} {}", req.method(), req.path()),
        success: None,
    })
}

pub async fn serve(service: GenerationService, port: u16) -> std::io::Result<()> {
    let state = web::Data::new(AppState { service });
    log::info!("🌐 Listening on 0.0.0.0:{}", port);

    HttpServer::new(move || {
        App::new()
            .wrap(cors_headers())
            .app_data(state.clone())
            .configure(configure)
            .default_service(web::to(fallback))
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
