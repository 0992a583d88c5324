use assistant_client::{AssistantClient, ClientConfig, ClientError, StreamCallbacks};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), ClientError> {
    let question = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    let question = if question.trim().is_empty() {
        "What documents do you know about?".to_string()
    } else {
        question
    };

    let client = AssistantClient::new(ClientConfig::from_env()?)?;
    let stream = client.stream_query(
        question,
        StreamCallbacks::new(
            |stage, message, _raw| eprintln!("[{stage}] {message}"),
            |result| match result.get("answer").and_then(|v| v.as_str()) {
                Some(answer) => println!("{answer}"),
                None => println!("{result}"),
            },
            |error| eprintln!("query failed: {error}"),
        ),
    )?;

    let summary = stream.finish().await?;
    eprintln!(
        "{} events dispatched, {} frames skipped",
        summary.events_dispatched, summary.skipped_frames
    );
    Ok(())
}
