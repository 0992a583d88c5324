use assistant_client::{AssistantClient, ClientConfig, ClientError};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: upload_document <file>");
        std::process::exit(2);
    };
    let bytes = std::fs::read(&path)
        .map_err(|e| ClientError::Validation(format!("cannot read {path}: {e}")))?;
    let file_name = std::path::Path::new(&path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload.bin")
        .to_string();

    let client = AssistantClient::new(ClientConfig::from_env()?)?;

    let health = client.health().await?;
    println!("service {} is {}", health.service, health.status);

    let document = client.upload_document(file_name, bytes).await?;
    println!(
        "uploaded {} as {} ({})",
        document.title, document.document_id, document.status
    );
    Ok(())
}
