use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Result, anyhow};
use grimoire_app::state::AppState;
use grimoire_server::config::{Parser, ServerConfig};
use rand::Rng as _;
use tempfile::TempDir;
use url::Url;

fn random_port() -> Result<u16> {
    let mut rng = rand::rng();

    let mut retries = 3;
    while retries > 0 {
        let port: u16 = rng.random_range(3030..4030);
        let addr: std::net::SocketAddr = format!("127.0.0.1:{}", port).parse()?;
        match std::net::TcpStream::connect_timeout(&addr, std::time::Duration::from_millis(100)) {
            Err(e) if e.kind() == std::io::ErrorKind::ConnectionRefused => return Ok(port),
            Err(_) => retries -= 1,
            Ok(_) => retries -= 1,
        }
    }

    Err(anyhow!("Could not find a free port"))
}

pub fn test_config(test_name: &str) -> Result<(ServerConfig, TempDir)> {
    let tmp_data_dir = TempDir::with_prefix(format!("{}_", test_name))?;
    let data_dir = tmp_data_dir.path().to_string_lossy().to_string();
    let port = random_port()?;
    let port = port.to_string();
    let base_url = format!("http://localhost:{}", port);
    let args = &[
        "grimoire-e2e-tests",
        "--data-dir",
        &data_dir,
        "--port",
        &port,
        "--base-url",
        &base_url,
    ];
    let config = ServerConfig::try_parse_from(args)?;
    Ok((config, tmp_data_dir))
}

pub struct TestEnv {
    pub base_url: Url,
    pub state: AppState,
    pub files_dir: PathBuf,
    // dropping the sender stops the server
    _shutdown: tokio::sync::oneshot::Sender<()>,
    _data_dir: TempDir,
}

pub async fn launch(test_name: &str) -> Result<TestEnv> {
    let (config, data_dir) = test_config(test_name)?;
    let base_url = config.base_url.clone();
    let files_dir = config.files_dir();

    let state = grimoire_server::build_state(&config).await?;
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    tokio::spawn(grimoire_server::run_graceful_with_state(
        config,
        state.clone(),
        async move {
            shutdown_rx.await.ok();
        },
    ));
    wait_ready(&base_url).await?;

    Ok(TestEnv {
        base_url,
        state,
        files_dir,
        _shutdown: shutdown_tx,
        _data_dir: data_dir,
    })
}

impl TestEnv {
    /// Client authenticated as the given user.
    pub fn client_for(&self, user_id: &str) -> Result<reqwest::Client> {
        let token = self.state.tokens().issue(user_id)?;
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {token}").parse()?,
        );
        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        Ok(client)
    }

    /// Client without any credentials.
    pub fn anonymous_client(&self) -> Result<reqwest::Client> {
        Ok(reqwest::Client::new())
    }

    pub fn api_url(&self, relative: &str) -> Url {
        self.base_url.join(relative).unwrap()
    }
}

async fn wait_ready(base_url: &Url) -> Result<()> {
    let health_url = base_url.join("health")?;
    for _ in 0..100 {
        if let Ok(response) = reqwest::get(health_url.clone()).await {
            if response.status().is_success() {
                return Ok(());
            }
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    Err(anyhow!("Server did not become ready"))
}
