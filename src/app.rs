use crate::{
    api,
    setting::{Processor, Setting},
    Error, Result, Service,
};
use actix_cors::Cors;
use actix_web::{
    body::MessageBody,
    dev::{ServiceFactory, ServiceRequest},
    middleware, web, App as WebApp, HttpServer,
};
use card_gateway::{CardIssuer, Charges, Marqeta, Sandbox, Stripe};
use sea_orm::{ConnectOptions, Database};
use std::{path::Path, sync::Arc, time::Duration};
use tracing::info;

pub struct AppState {
    pub service: Service,
    pub setting: Setting,
}

impl AppState {
    pub async fn create<P: AsRef<Path>>(
        setting_path: Option<P>,
        setting_env_prefix: Option<String>,
    ) -> Result<Self> {
        let env_notice = setting_env_prefix
            .as_ref()
            .map(|s| {
                format!(
                    ", config will be overridden by ENV setting with prefix `{}_`",
                    s
                )
            })
            .unwrap_or_default();

        let setting = if let Some(path) = setting_path {
            info!("Load config {:?}{}", path.as_ref(), env_notice);
            Setting::read(path.as_ref(), setting_env_prefix)?
        } else if let Some(prefix) = setting_env_prefix {
            info!("Load default config{}", env_notice);
            Setting::from_env(prefix)?
        } else {
            info!("Load default config");
            Setting::default()
        };

        info!(
            processor = ?setting.processor,
            fee_pct = setting.fee.contribution_pct,
            "config loaded"
        );

        Self::from_setting(setting).await
    }

    pub async fn from_setting(setting: Setting) -> Result<Self> {
        let timeout = Some(setting.gateway.timeout());
        let (issuer, charges): (
            Box<dyn CardIssuer + Sync + Send>,
            Box<dyn Charges + Sync + Send>,
        ) = match setting.processor {
            Processor::Sandbox => {
                let sandbox = Sandbox::new();
                (Box::new(sandbox.clone()), Box::new(sandbox))
            }
            Processor::Hosted => {
                let m = setting
                    .marqeta
                    .clone()
                    .ok_or_else(|| Error::Message("Need config marqeta".to_string()))?;
                let s = setting
                    .stripe
                    .clone()
                    .ok_or_else(|| Error::Message("Need config stripe".to_string()))?;
                let issuer = Marqeta::connect(
                    m.url,
                    m.username,
                    m.password,
                    m.card_product_token,
                    timeout,
                )?;
                let charges = Stripe::connect(s.url, s.secret_key, timeout)?;
                (Box::new(issuer), Box::new(charges))
            }
        };
        Self::with_processor(setting, issuer, charges).await
    }

    /// Build the state on given processor clients.
    pub async fn with_processor(
        setting: Setting,
        issuer: Box<dyn CardIssuer + Sync + Send>,
        charges: Box<dyn Charges + Sync + Send>,
    ) -> Result<Self> {
        let mut options = ConnectOptions::from(&setting.db_url);
        options.sqlx_logging_level(tracing::log::LevelFilter::Trace);
        if setting.db_url.contains(":memory:") {
            // every pooled connection would open its own database
            options.max_connections(1);
        }
        let conn = Database::connect(options).await?;
        let service = Service::new(issuer, charges, conn, setting.gateway.timeout());

        Ok(Self { service, setting })
    }
}

pub fn create_web_app(
    data: web::Data<AppState>,
) -> WebApp<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse<impl MessageBody>,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    WebApp::new()
        .app_data(data)
        .wrap(middleware::Logger::default()) // enable logger
        .wrap(
            Cors::default()
                .allow_any_header()
                .allow_any_origin()
                .allow_any_method()
                .max_age(86_400),
        )
        .service(api::scope())
}

/// start the sync task that reconciles pending contributions with the processor.
pub fn start_service_sync(state: Arc<AppState>) {
    let _r = tokio::spawn(async move {
        let sync = &state.setting.sync;
        state
            .service
            .sync(
                Duration::from_secs(sync.interval_secs),
                Duration::from_secs(sync.pending_window_secs),
                Duration::from_secs(sync.lookback_secs),
            )
            .await
    });
}

/// start app and tasks
pub async fn start(state: AppState) -> Result<()> {
    let state = web::Data::new(state);

    start_service_sync(state.clone().into_inner());

    let c_data = state.clone();
    let server = HttpServer::new(move || create_web_app(c_data.clone()));
    let num = if state.setting.thread.http == 0 {
        num_cpus::get()
    } else {
        state.setting.thread.http
    };
    let host = state.setting.network.host.clone();
    let port = state.setting.network.port;
    info!("Start http server {}:{}", host, port);
    server.workers(num).bind((host, port))?.run().await?;
    Ok(())
}
