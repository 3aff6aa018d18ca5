#![allow(clippy::unwrap_used, clippy::expect_used)]
#![allow(dead_code)]
use std::time::Duration;

use anyhow::Result;
use booru_db::DbConfig;
use testcontainers::{ImageExt, runners::AsyncRunner};

pub struct MysqlUnderTest {
    pub port: u16,
    _cleanup: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl MysqlUnderTest {
    #[must_use]
    pub fn config(&self) -> DbConfig {
        let mut cfg = DbConfig {
            host: "127.0.0.1".to_owned(),
            port: self.port,
            user: "user".to_owned(),
            password: Some("pass".into()),
            dbname: "app".to_owned(),
            ..DbConfig::default()
        };
        cfg.pool.max_conns = Some(4);
        cfg
    }
}

/// Bring up a `MySQL` container for testing.
///
/// # Errors
/// Returns an error if the container fails to start or the port cannot be obtained.
pub async fn bring_up_mysql() -> Result<MysqlUnderTest> {
    use testcontainers::ContainerRequest;
    use testcontainers_modules::mysql::Mysql;

    let container = ContainerRequest::from(Mysql::default())
        .with_env_var("MYSQL_ROOT_PASSWORD", "root")
        .with_env_var("MYSQL_USER", "user")
        .with_env_var("MYSQL_PASSWORD", "pass")
        .with_env_var("MYSQL_DATABASE", "app")
        .start()
        .await?;
    let port = container.get_host_port_ipv4(3306).await?;
    wait_for_tcp("127.0.0.1", port, Duration::from_secs(30)).await?;

    Ok(MysqlUnderTest {
        port,
        _cleanup: Some(Box::new(move || drop(container))),
    })
}

async fn wait_for_tcp(host: &str, port: u16, timeout: Duration) -> Result<()> {
    use tokio::{
        net::TcpStream,
        time::{Instant, sleep},
    };
    let deadline = Instant::now() + timeout;
    loop {
        if TcpStream::connect((host, port)).await.is_ok() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            anyhow::bail!("Timeout waiting for {host}:{port}");
        }
        sleep(Duration::from_millis(200)).await;
    }
}
