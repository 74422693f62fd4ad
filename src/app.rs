use crate::ai::Generator;
use crate::config::{AppConfig, DeliveryConfig, DeliveryStrategy, HTTPConfig};
use crate::delivery::CallbackSender;
use crate::http::create_app;
use crate::queue::QueueClient;
use crate::TracingReloadHandle;
use anyhow::Result;
use tokio::task::JoinHandle;
use tracing::log::{error, info};

pub struct AppHandles {
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}
impl AppHandles {
    pub fn new(config: AppConfig, tracing_reload: TracingReloadHandle) -> Result<AppHandles> {
        let mut tasks = Vec::new();

        let generator = Generator::new(config.ai.clone());

        // The delivery worker always runs. The skill route dispatches to it
        // whenever the background strategy is selected.
        let (callbacks, delivery_handle) = CallbackSender::new(generator.clone());
        tasks.push(("Callback Delivery", delivery_handle));

        // Queue client only exists for the queue strategy. Config validation
        // already guaranteed the [queue] section is present for it.
        let queue = match (config.delivery.strategy, &config.queue) {
            (DeliveryStrategy::Queue, Some(queue_config)) => Some(QueueClient::new(queue_config)?),
            _ => None,
        };

        if let Some(http_handle) = Self::start_http_server(
            config.http,
            config.delivery,
            generator,
            callbacks,
            queue,
            tracing_reload,
        ) {
            tasks.push(("HTTP Server", http_handle));
        }

        Ok(AppHandles { tasks })
    }

    pub async fn run(self) {
        let futures: Vec<_> = self
            .tasks
            .into_iter()
            .map(|(name, handle)| {
                info!("Starting task: {name}");
                Box::pin(async move {
                    match handle.await {
                        Ok(_) => error!("{name} task completed!"),
                        Err(e) => error!("{name} task failed: {e:?}!"),
                    }
                })
            })
            .collect();

        // Wait for any task to complete. All handles are boxed, so when dropped they are cancelled.
        let (_, _, remaining) = futures::future::select_all(futures).await;
        drop(remaining);
    }

    fn start_http_server(
        config: HTTPConfig,
        delivery_config: DeliveryConfig,
        generator: Generator,
        callbacks: CallbackSender,
        queue: Option<QueueClient>,
        tracing_reload: TracingReloadHandle,
    ) -> Option<JoinHandle<()>> {
        if !config.enabled {
            info!("HTTP server disabled in config");
            return None;
        }

        let address = config.address;
        let tls_config = config.tls;

        let app = create_app(delivery_config, generator, callbacks, queue, tracing_reload);
        let handle = tokio::spawn(async move {
            let result = match tls_config {
                Some(_tls_config) => {
                    #[cfg(any(feature = "tls-rustls", feature = "tls-native"))]
                    {
                        info!("Starting HTTPS (secure) server on {address}");

                        #[cfg(feature = "tls-rustls")]
                        {
                            let _ = rustls::crypto::CryptoProvider::install_default(
                                rustls::crypto::aws_lc_rs::default_provider(),
                            );
                            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(
                                &_tls_config.certificate_path,
                                &_tls_config.key_path,
                            )
                            .await
                            .expect("Failed to load rustls TLS certificates!");
                            axum_server::bind_rustls(address, tls)
                                .serve(app.into_make_service())
                                .await
                                .map_err(anyhow::Error::from)
                        }

                        #[cfg(all(feature = "tls-native", not(feature = "tls-rustls")))]
                        {
                            let tls = axum_server::tls_openssl::OpenSSLConfig::from_pem_file(
                                &_tls_config.certificate_path,
                                &_tls_config.key_path,
                            )
                            .expect("Failed to load openssl TLS certificates!");
                            axum_server::bind_openssl(address, tls)
                                .serve(app.into_make_service())
                                .await
                                .map_err(anyhow::Error::from)
                        }
                    }

                    #[cfg(not(any(feature = "tls-rustls", feature = "tls-native")))]
                    Err(anyhow::anyhow!(
                        "HTTP Server TLS configuration provided but no TLS features enabled. Compile with a TLS backend feature!"
                    ))
                }
                None => {
                    info!("Starting HTTP (insecure) server on {address}");
                    axum_server::bind(address)
                        .serve(app.into_make_service())
                        .await
                        .map_err(anyhow::Error::from)
                }
            };

            if let Err(e) = result {
                error!("Server error: {e:?}");
            }
        });

        Some(handle)
    }
}
