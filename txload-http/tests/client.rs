use std::time::Duration;

use anyhow::Context as _;
use txload_http::{HttpClient, HttpRequest, HttpTransportErrorKind};
use txload_testserver::{HttpBehavior, TestServer};

const BODY: &str = r#"{"id":"T1","currency":"USD","amount":10.5,"source_account":"A","destination_account":"B"}"#;

#[tokio::test]
async fn post_json_reaches_server_with_content_type() -> anyhow::Result<()> {
    let server = TestServer::start().await.context("start test server")?;
    let client = HttpClient::default();

    let res = client
        .request(HttpRequest::post_json(server.payments_url(), BODY))
        .await?;

    anyhow::ensure!(res.status == 200, "unexpected status {}", res.status);
    let body = std::str::from_utf8(&res.body).context("utf-8 body")?;
    anyhow::ensure!(body.contains("\"ok\""), "unexpected body {body}");
    anyhow::ensure!(server.stats().json_content_type_total() == 1);

    let seen = server.stats().last_payment().context("payment recorded")?;
    anyhow::ensure!(seen.id == "T1" && seen.amount == 10.5);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn non_2xx_is_a_response_not_an_error() -> anyhow::Result<()> {
    let server = TestServer::start_with(HttpBehavior::AlwaysStatus(500), Duration::ZERO)
        .await
        .context("start test server")?;
    let client = HttpClient::default();

    let res = client
        .request(HttpRequest::post_json(server.payments_url(), BODY))
        .await?;
    anyhow::ensure!(res.status == 500);

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn slow_server_hits_request_timeout() -> anyhow::Result<()> {
    let server = TestServer::start_with(HttpBehavior::AlwaysOk, Duration::from_millis(500))
        .await
        .context("start test server")?;
    let client = HttpClient::default();

    let req = HttpRequest::post_json(server.payments_url(), BODY)
        .with_timeout(Duration::from_millis(50));
    let err = match client.request(req).await {
        Ok(res) => anyhow::bail!("expected timeout, got {}", res.status),
        Err(e) => e,
    };
    anyhow::ensure!(err.transport_error_kind() == HttpTransportErrorKind::Timeout);

    drop(server);
    Ok(())
}
