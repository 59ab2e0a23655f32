//! Telegram channel binding
//!
//! Talks to the Telegram Bot API: one multiple-answer poll per batch of
//! dates, a single background `getUpdates` long-poll listener streaming poll
//! answers into the store, and `stopPoll` at gather time, whose response
//! carries the final results, so gather also works in a process that never
//! saw the request.
//!
//! The Bot API only allows one `getUpdates` consumer, so the adapter runs
//! exactly one listener per cycle regardless of how many persons it prompts.

use crate::channels::format;
use async_trait::async_trait;
use freeday_application::{AdapterError, ChannelAdapter, CycleHandle, PendingRequest};
use freeday_domain::{DateLabel, Outcome, Person};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};

const API_BASE: &str = "https://api.telegram.org";

/// Long-poll timeout handed to `getUpdates`, in seconds.
const UPDATES_TIMEOUT_SECS: u32 = 50;

/// Handles persisted per prompt batch, enough to stop the poll later.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TelegramBatch {
    chat_id: i64,
    message_id: i64,
    poll_id: String,
    dates: Vec<DateLabel>,
}

/// A live poll the update listener is watching.
#[derive(Debug, Clone)]
struct TrackedPoll {
    person: String,
    dates: Vec<DateLabel>,
}

#[derive(Default)]
struct LiveState {
    /// Sequence of the cycle the running listener belongs to
    listener_cycle: Option<u64>,
    /// poll id -> who and which dates it asks about
    polls: HashMap<String, TrackedPoll>,
}

/// [`ChannelAdapter`] over the Telegram Bot API.
#[derive(Clone)]
pub struct TelegramAdapter {
    http: reqwest::Client,
    token: String,
    live: Arc<Mutex<LiveState>>,
}

impl TelegramAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
            live: Arc::new(Mutex::new(LiveState::default())),
        }
    }

    fn session(&self) -> Result<(), AdapterError> {
        if self.token.is_empty() {
            return Err(AdapterError::NotInitialized);
        }
        Ok(())
    }

    fn chat_id(person: &Person) -> Result<i64, AdapterError> {
        person
            .channel_id
            .parse::<i64>()
            .map_err(|_| AdapterError::InvalidPersonId(person.channel_id.clone()))
    }

    async fn call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, AdapterError> {
        let url = format!("{API_BASE}/bot{}/{method}", self.token);
        let resp = self
            .http
            .post(&url)
            .json(&params)
            .send()
            .await
            .map_err(|e| AdapterError::ChannelUnavailable(e.to_string()))?;

        let envelope: TgResponse<T> = resp
            .json()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        if !envelope.ok {
            return Err(AdapterError::Transport(format!(
                "telegram {method} failed: {}",
                envelope.description.unwrap_or_default()
            )));
        }
        envelope
            .result
            .ok_or_else(|| AdapterError::Transport(format!("telegram {method} returned no result")))
    }

    async fn send_poll(
        &self,
        chat_id: i64,
        question: &str,
        options: &[String],
    ) -> Result<TgMessage, AdapterError> {
        self.call(
            "sendPoll",
            serde_json::json!({
                "chat_id": chat_id,
                "question": question,
                "options": options,
                "allows_multiple_answers": true,
            }),
        )
        .await
    }

    async fn stop_poll(&self, chat_id: i64, message_id: i64) -> Result<TgPoll, AdapterError> {
        self.call(
            "stopPoll",
            serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
        )
        .await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), AdapterError> {
        let _: TgMessage = self
            .call(
                "sendMessage",
                serde_json::json!({ "chat_id": chat_id, "text": text }),
            )
            .await?;
        Ok(())
    }

    async fn get_updates(&self, offset: i64) -> Result<Vec<TgUpdate>, AdapterError> {
        self.call(
            "getUpdates",
            serde_json::json!({
                "offset": offset,
                "timeout": UPDATES_TIMEOUT_SECS,
                "allowed_updates": ["poll"],
            }),
        )
        .await
    }

    /// Start the update listener for this cycle if it isn't running yet.
    async fn ensure_listener(&self, cycle: &CycleHandle) {
        let mut live = self.live.lock().await;
        if live.listener_cycle == Some(cycle.cycle().seq()) {
            return;
        }
        // A previous cycle's listener (if any) exits via its own token.
        live.listener_cycle = Some(cycle.cycle().seq());
        live.polls.clear();

        let adapter = self.clone();
        let cycle = cycle.clone();
        tokio::spawn(async move { adapter.run_listener(cycle).await });
    }

    /// Stream poll answers into the store until the stop signal fires, then
    /// signal completion for every person this adapter prompted.
    async fn run_listener(self, cycle: CycleHandle) {
        debug!(cycle = %cycle.cycle(), "telegram update listener running");
        let mut offset: i64 = 0;

        loop {
            let updates = tokio::select! {
                _ = cycle.cancelled().cancelled() => break,
                updates = self.get_updates(offset) => updates,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        if let Some(poll) = update.poll {
                            self.apply_poll(&cycle, &poll).await;
                        }
                    }
                }
                Err(e) => {
                    warn!("telegram getUpdates failed: {e}");
                    tokio::select! {
                        _ = cycle.cancelled().cancelled() => break,
                        _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                    }
                }
            }
        }

        let live = self.live.lock().await;
        for tracked in live.polls.values() {
            cycle.complete(&tracked.person);
        }
        debug!(cycle = %cycle.cycle(), "telegram update listener stopped");
    }

    /// Write one poll state into its person's availability map.
    async fn apply_poll(&self, cycle: &CycleHandle, poll: &TgPoll) {
        let tracked = {
            let live = self.live.lock().await;
            live.polls.get(&poll.id).cloned()
        };
        let Some(tracked) = tracked else {
            return;
        };

        for (i, option) in poll.options.iter().enumerate() {
            let Some(&date) = tracked.dates.get(i) else {
                continue;
            };
            let free = option.voter_count > 0;
            cycle.store().set(&tracked.person, date, free).await;
            debug!(person = %tracked.person, %date, free, "poll answer applied");
        }
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    async fn request(&self, person: &Person, cycle: &CycleHandle) -> Result<(), AdapterError> {
        self.session()?;
        let chat_id = Self::chat_id(person)?;
        self.ensure_listener(cycle).await;

        cycle
            .store()
            .seed_labels(&person.name, cycle.labels().iter().copied())
            .await;

        let question = request_header(cycle.title());
        for (i, dates) in format::batches(cycle.labels()).into_iter().enumerate() {
            let options: Vec<String> = dates.iter().map(ToString::to_string).collect();
            let message = self.send_poll(chat_id, &question, &options).await?;
            let Some(poll) = message.poll else {
                return Err(AdapterError::Transport(
                    "sendPoll response carried no poll".to_string(),
                ));
            };

            let batch = TelegramBatch {
                chat_id,
                message_id: message.message_id,
                poll_id: poll.id.clone(),
                dates: dates.clone(),
            };
            cycle
                .pending()
                .save(PendingRequest {
                    owner: cycle.owner().to_string(),
                    cycle: cycle.cycle().seq(),
                    person: person.name.clone(),
                    batch_index: i as u32,
                    channel: "telegram".to_string(),
                    payload: serde_json::to_value(&batch)
                        .map_err(|e| AdapterError::Transport(e.to_string()))?,
                })
                .await?;

            let mut live = self.live.lock().await;
            live.polls.insert(
                poll.id,
                TrackedPoll {
                    person: person.name.clone(),
                    dates,
                },
            );
        }

        debug!(person = %person.name, "telegram polls sent");
        Ok(())
    }

    async fn gather(&self, person: &Person, cycle: &CycleHandle) -> Result<(), AdapterError> {
        self.session()?;
        let records = cycle.pending().find(cycle.owner(), &person.name).await?;
        if records.is_empty() {
            return Ok(());
        }

        for record in records {
            let batch: TelegramBatch = serde_json::from_value(record.payload.clone())
                .map_err(|e| AdapterError::Transport(e.to_string()))?;

            // A restarted process has no map yet; cover the recorded dates
            // without clobbering anything the listener already wrote.
            cycle
                .store()
                .ensure_labels(&person.name, batch.dates.iter().copied())
                .await;

            // The stopPoll response carries the final results.
            let poll = self.stop_poll(batch.chat_id, batch.message_id).await?;
            for (i, option) in poll.options.iter().enumerate() {
                let Some(&date) = batch.dates.get(i) else {
                    continue;
                };
                cycle
                    .store()
                    .set(&person.name, date, option.voter_count > 0)
                    .await;
            }

            self.live.lock().await.polls.remove(&batch.poll_id);
            cycle.pending().delete(&record).await?;
        }

        debug!(person = %person.name, "telegram gather finished");
        Ok(())
    }

    async fn respond(
        &self,
        person: &Person,
        cycle: &CycleHandle,
        outcome: &Outcome,
    ) -> Result<(), AdapterError> {
        self.session()?;
        let chat_id = Self::chat_id(person)?;
        self.send_message(chat_id, &response_message(cycle.title(), outcome))
            .await
    }
}

fn request_header(title: &str) -> String {
    format!("Schedule for {title}\n\nPick the dates you are free")
}

fn response_message(title: &str, outcome: &Outcome) -> String {
    format!(
        "Schedule results for {title}\n\n{}\n\n{}{}",
        format::fraction(outcome),
        format::day_lines(outcome),
        format::unknown_block(outcome),
    )
}

// Bot API response shapes (only the fields we read)

#[derive(Debug, Deserialize)]
struct TgResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TgMessage {
    message_id: i64,
    poll: Option<TgPoll>,
}

#[derive(Debug, Deserialize)]
struct TgUpdate {
    update_id: i64,
    poll: Option<TgPoll>,
}

#[derive(Debug, Deserialize)]
struct TgPoll {
    id: String,
    options: Vec<TgPollOption>,
}

#[derive(Debug, Deserialize)]
struct TgPollOption {
    #[allow(dead_code)]
    text: String,
    voter_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use freeday_domain::Day;

    fn label(day: u32) -> DateLabel {
        DateLabel::new(NaiveDate::from_ymd_opt(2023, 1, day).unwrap())
    }

    fn person(id: &str) -> Person {
        Person {
            name: "alice".to_string(),
            request_channel: "telegram".to_string(),
            response_channel: "telegram".to_string(),
            channel_id: id.to_string(),
        }
    }

    #[test]
    fn test_chat_id_must_be_numeric() {
        assert_eq!(TelegramAdapter::chat_id(&person("12345")).unwrap(), 12345);
        assert!(matches!(
            TelegramAdapter::chat_id(&person("@alice")),
            Err(AdapterError::InvalidPersonId(_))
        ));
    }

    #[test]
    fn test_poll_options_follow_batch_date_order() {
        let dates = vec![label(2), label(3)];
        let options: Vec<String> = dates.iter().map(ToString::to_string).collect();
        assert_eq!(options, vec!["Monday 01/02", "Tuesday 01/03"]);
    }

    #[test]
    fn test_response_message_shape() {
        let outcome = Outcome {
            days: vec![Day {
                label: label(2),
                people: vec!["alice".to_string(), "bob".to_string()],
            }],
            unknowns: vec![],
            quorum: 2,
            roster_size: 2,
        };

        let message = response_message("Game Night", &outcome);
        assert!(message.starts_with("Schedule results for Game Night"));
        assert!(message.contains("2/2 people available"));
        assert!(message.contains("- Monday 01/02 (alice, bob)"));
        assert!(!message.contains("No responses from"));
    }

    #[test]
    fn test_batch_payload_round_trip() {
        let batch = TelegramBatch {
            chat_id: 42,
            message_id: 7,
            poll_id: "p1".to_string(),
            dates: vec![label(2)],
        };

        let value = serde_json::to_value(&batch).unwrap();
        let back: TelegramBatch = serde_json::from_value(value).unwrap();
        assert_eq!(back.chat_id, 42);
        assert_eq!(back.poll_id, "p1");
        assert_eq!(back.dates, vec![label(2)]);
    }

    #[test]
    fn test_update_envelope_parses() {
        let raw = r#"{
            "ok": true,
            "result": [{
                "update_id": 10,
                "poll": {
                    "id": "p1",
                    "options": [
                        {"text": "Monday 01/02", "voter_count": 1},
                        {"text": "Tuesday 01/03", "voter_count": 0}
                    ]
                }
            }]
        }"#;

        let envelope: TgResponse<Vec<TgUpdate>> = serde_json::from_str(raw).unwrap();
        assert!(envelope.ok);
        let updates = envelope.result.unwrap();
        assert_eq!(updates.len(), 1);
        let poll = updates[0].poll.as_ref().unwrap();
        assert_eq!(poll.options[0].voter_count, 1);
        assert_eq!(poll.options[1].voter_count, 0);
    }
}
