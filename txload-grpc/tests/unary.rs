use std::time::Duration;

use anyhow::Context as _;
use serde_json::json;
use txload_grpc::{
    Code, ConnectOptions, ConvertError, GrpcClient, GrpcTransportErrorKind, InvokeOptions,
    ProtoSchema, json_to_message,
};
use txload_testserver::{GrpcBehavior, GrpcTestServer, PAYMENTS_DESCRIPTOR_SET};

const METHOD: &str = "payments.v1.PaymentsService/CreatePayment";

fn schema() -> anyhow::Result<ProtoSchema> {
    Ok(ProtoSchema::from_descriptor_set_bytes(
        PAYMENTS_DESCRIPTOR_SET,
    )?)
}

fn request() -> serde_json::Value {
    json!({
        "id": "PAY-1",
        "amount_minor": 1050,
        "currency": "USD",
        "user_id": "A",
        "destination_account": "B",
    })
}

#[tokio::test]
async fn ok_call_returns_response_fields() -> anyhow::Result<()> {
    let server = GrpcTestServer::start().await.context("start grpc server")?;
    let method = schema()?.method(METHOD)?;
    let client = GrpcClient::connect(&server.target(), ConnectOptions::default()).await?;

    let res = client
        .unary_json(&method, &request(), InvokeOptions::default())
        .await?;

    anyhow::ensure!(res.ok, "unexpected status {:?}", res.status);
    anyhow::ensure!(res.status == Code::Ok);
    let payment_id = res
        .response
        .as_ref()
        .and_then(|r| r.get("payment_id"))
        .and_then(|v| v.as_str());
    anyhow::ensure!(payment_id == Some("pay_1"), "got {:?}", res.response);

    let seen = server.stats().last_request().context("request recorded")?;
    anyhow::ensure!(seen.amount_minor == 1050);
    anyhow::ensure!(seen.currency == 1);
    anyhow::ensure!(seen.user_id == "A" && seen.destination_account == "B");

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn error_status_is_a_result_not_an_error() -> anyhow::Result<()> {
    let server = GrpcTestServer::start_with(GrpcBehavior::AlwaysStatus(Code::InvalidArgument))
        .await
        .context("start grpc server")?;
    let method = schema()?.method(METHOD)?;
    let client = GrpcClient::connect(&server.target(), ConnectOptions::default()).await?;

    let res = client
        .unary_json(&method, &request(), InvokeOptions::default())
        .await?;

    anyhow::ensure!(!res.ok);
    anyhow::ensure!(res.status == Code::InvalidArgument);
    anyhow::ensure!(res.response.is_none());
    anyhow::ensure!(res.message.as_deref() == Some("payment rejected"));

    server.shutdown().await;
    Ok(())
}

#[tokio::test]
async fn closed_port_fails_to_connect() -> anyhow::Result<()> {
    let server = GrpcTestServer::start().await.context("start grpc server")?;
    let target = server.target();
    server.shutdown().await;

    let opts = ConnectOptions {
        timeout: Some(Duration::from_millis(500)),
    };
    let err = match GrpcClient::connect(&target, opts).await {
        Ok(_) => anyhow::bail!("expected connect failure"),
        Err(e) => e,
    };
    anyhow::ensure!(err.transport_error_kind() == GrpcTransportErrorKind::Connect);
    Ok(())
}

#[test]
fn enum_fields_accept_names_and_numbers() -> anyhow::Result<()> {
    let input = schema()?.method(METHOD)?.input();

    let by_name = json_to_message(&input, &json!({"currency": "SGD"}))?;
    let by_number = json_to_message(&input, &json!({"currency": 3}))?;
    anyhow::ensure!(by_name == by_number);

    let err = json_to_message(&input, &json!({"currency": "EUR"}));
    anyhow::ensure!(matches!(err, Err(ConvertError::UnknownEnumValue { .. })));
    Ok(())
}

#[test]
fn mistyped_and_unknown_fields_are_rejected() -> anyhow::Result<()> {
    let input = schema()?.method(METHOD)?.input();

    let err = json_to_message(&input, &json!({"amount_minor": "ten"}));
    anyhow::ensure!(matches!(err, Err(ConvertError::InvalidValue { .. })));

    let err = json_to_message(&input, &json!({"amount_minor": 10.5}));
    anyhow::ensure!(matches!(err, Err(ConvertError::InvalidValue { .. })));

    let err = json_to_message(&input, &json!({"user": "A"}));
    anyhow::ensure!(matches!(err, Err(ConvertError::UnknownField { .. })));

    let err = json_to_message(&input, &json!(["not", "an", "object"]));
    anyhow::ensure!(matches!(err, Err(ConvertError::NotAnObject { .. })));
    Ok(())
}

#[test]
fn json_names_and_nulls_are_accepted() -> anyhow::Result<()> {
    let input = schema()?.method(METHOD)?.input();
    let msg = json_to_message(
        &input,
        &json!({"amountMinor": "1050", "userId": "A", "id": null}),
    )?;
    let rendered = txload_grpc::message_to_json(&msg);
    anyhow::ensure!(rendered == json!({"amount_minor": 1050, "user_id": "A"}), "{rendered}");
    Ok(())
}

#[test]
fn unknown_services_and_methods_are_rejected() -> anyhow::Result<()> {
    let schema = schema()?;
    anyhow::ensure!(schema.method("payments.v1.PaymentsService/Refund").is_err());
    anyhow::ensure!(schema.method("payments.v1.Nope/CreatePayment").is_err());
    Ok(())
}
