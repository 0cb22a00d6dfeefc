//! Running several blocking chats side by side under one deadline.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::client::LLMClient;
use crate::error::LLMError;
use crate::types::{ChatRequest, ChatResponse};

/// Runs every request on its own thread and waits at most `deadline` for all of them.
///
/// Results come back in request order. A call still running when the deadline
/// passes yields [`LLMError::Aborted`]; its thread is left to finish on its own
/// and whatever it produces is discarded.
pub fn chat_all_with_deadline(
    client: Arc<LLMClient>,
    requests: Vec<ChatRequest>,
    deadline: Duration,
) -> Vec<Result<ChatResponse, LLMError>> {
    let started = Instant::now();
    let total = requests.len();
    let (sender, receiver) = mpsc::channel();

    for (index, request) in requests.into_iter().enumerate() {
        let client = Arc::clone(&client);
        let worker_sender = sender.clone();
        let spawned = thread::Builder::new()
            .name(format!("dialecta-llm-chat-{index}"))
            .spawn(move || {
                let result = client.chat(request);
                // the receiver is gone once the deadline has passed
                let _ = worker_sender.send((index, result));
            });
        if let Err(err) = spawned {
            let _ = sender.send((
                index,
                Err(LLMError::Unknown {
                    message: format!("failed to spawn chat worker: {err}"),
                }),
            ));
        }
    }
    drop(sender);

    let mut results: Vec<Option<Result<ChatResponse, LLMError>>> =
        (0..total).map(|_| None).collect();
    let mut received = 0;
    while received < total {
        let remaining = deadline.saturating_sub(started.elapsed());
        match receiver.recv_timeout(remaining) {
            Ok((index, result)) => {
                results[index] = Some(result);
                received += 1;
            }
            Err(_) => break,
        }
    }

    results
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.unwrap_or_else(|| {
                warn!(request = index, deadline_ms = deadline.as_millis() as u64, "chat abandoned at deadline");
                Err(LLMError::Aborted {
                    message: format!(
                        "request {index} did not finish within {:.1}s",
                        deadline.as_secs_f64()
                    ),
                })
            })
        })
        .collect()
}
