use serde_json::{json, Value};
use teller_http::{ApiClient, BuildMode, ClientOptions};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let api = ApiClient::from_env()?.with_options(ClientOptions {
        mode: BuildMode::Development,
        ..ClientOptions::default()
    });

    let accounts = api.get::<Value, _>("accounts/", [("page", "1")]).await?;
    println!("accounts: {:?}", accounts.data);

    let created = api
        .post::<Value, _, _>("transfers/", &json!({"from": 1, "to": 2, "amount": "25.00"}), ())
        .await?;
    println!("transfer created: {:?}", created.data);

    Ok(())
}
