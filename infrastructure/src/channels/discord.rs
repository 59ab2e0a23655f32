//! Discord channel binding
//!
//! Talks to the plain Discord REST API: open a DM, send one prompt message
//! per batch of dates, seed it with numeric-emoji reactions plus ❌ for
//! "none", and read the reactions back. Collection runs in one background
//! poller per batch that re-reads reactions until the cycle's stop signal
//! fires; a date counts as free while its emoji has a second reactor besides
//! the bot.
//!
//! Gather re-reads the final reaction state from the handles persisted at
//! request time, so it also works in a process that never saw the request.

use crate::channels::format;
use async_trait::async_trait;
use freeday_application::{AdapterError, ChannelAdapter, CycleHandle, PendingRequest};
use freeday_domain::{DateLabel, Outcome, Person};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const API_BASE: &str = "https://discord.com/api/v10";

/// How often a batch poller re-reads reactions.
const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// A date is free while its emoji has this many reactors (the bot's own
/// seeding reaction plus the person).
const REACTED: usize = 2;

/// Handles persisted per prompt batch, enough to re-read reactions later.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DiscordBatch {
    channel_id: String,
    message_id: String,
    dates: Vec<DateLabel>,
}

/// [`ChannelAdapter`] over the Discord REST API.
#[derive(Clone)]
pub struct DiscordAdapter {
    http: reqwest::Client,
    token: String,
}

impl DiscordAdapter {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            token: token.into(),
        }
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    fn session(&self) -> Result<(), AdapterError> {
        if self.token.is_empty() {
            return Err(AdapterError::NotInitialized);
        }
        Ok(())
    }

    async fn post_json<T: serde::de::DeserializeOwned>(
        &self,
        url: String,
        body: serde_json::Value,
    ) -> Result<T, AdapterError> {
        let resp = self
            .http
            .post(&url)
            .header("Authorization", self.auth())
            .json(&body)
            .send()
            .await
            .map_err(|e| AdapterError::ChannelUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Transport(format!(
                "discord returned {status}: {body}"
            )));
        }
        resp.json::<T>()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))
    }

    /// Open (or reuse) the DM channel with a user.
    async fn create_dm(&self, user_id: &str) -> Result<String, AdapterError> {
        let channel: DmChannel = self
            .post_json(
                format!("{API_BASE}/users/@me/channels"),
                serde_json::json!({ "recipient_id": user_id }),
            )
            .await?;
        Ok(channel.id)
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
    ) -> Result<String, AdapterError> {
        let message: Message = self
            .post_json(
                format!("{API_BASE}/channels/{channel_id}/messages"),
                serde_json::json!({ "content": content }),
            )
            .await?;
        Ok(message.id)
    }

    /// Seed a reaction as the bot, so the person only has to tap it.
    async fn add_reaction(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<(), AdapterError> {
        let emoji = utf8_percent_encode(emoji, NON_ALPHANUMERIC);
        let resp = self
            .http
            .put(format!(
                "{API_BASE}/channels/{channel_id}/messages/{message_id}/reactions/{emoji}/@me"
            ))
            .header("Authorization", self.auth())
            .header("Content-Length", "0")
            .send()
            .await
            .map_err(|e| AdapterError::ChannelUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Transport(format!(
                "discord returned {status}: {body}"
            )));
        }
        Ok(())
    }

    /// How many users have reacted with an emoji (bounded; we only care
    /// whether anyone joined the bot's seeding reaction).
    async fn reaction_count(
        &self,
        channel_id: &str,
        message_id: &str,
        emoji: &str,
    ) -> Result<usize, AdapterError> {
        let emoji = utf8_percent_encode(emoji, NON_ALPHANUMERIC);
        let resp = self
            .http
            .get(format!(
                "{API_BASE}/channels/{channel_id}/messages/{message_id}/reactions/{emoji}"
            ))
            .query(&[("limit", "3")])
            .header("Authorization", self.auth())
            .send()
            .await
            .map_err(|e| AdapterError::ChannelUnavailable(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AdapterError::Transport(format!(
                "discord returned {status}: {body}"
            )));
        }
        let users: Vec<ReactionUser> = resp
            .json()
            .await
            .map_err(|e| AdapterError::Transport(e.to_string()))?;
        Ok(users.len())
    }

    /// Re-read one batch's reactions until the stop signal fires.
    async fn poll_batch(self, person: String, cycle: CycleHandle, batch: DiscordBatch) {
        loop {
            if cycle.cancelled().is_cancelled() {
                break;
            }

            for (j, &date) in batch.dates.iter().enumerate() {
                match self
                    .reaction_count(&batch.channel_id, &batch.message_id, format::EMOJIS[j])
                    .await
                {
                    Ok(count) => {
                        cycle.store().set(&person, date, count >= REACTED).await;
                    }
                    Err(e) => warn!(person = %person, "could not read reactions: {e}"),
                }
            }

            match self
                .reaction_count(&batch.channel_id, &batch.message_id, format::NONE_EMOJI)
                .await
            {
                Ok(count) if count >= REACTED => {
                    // "No dates work" wipes everything collected so far.
                    cycle.store().reset(&person).await;
                    break;
                }
                Ok(_) => {}
                Err(e) => warn!(person = %person, "could not read reactions: {e}"),
            }

            tokio::select! {
                _ = cycle.cancelled().cancelled() => break,
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
            }
        }
    }

    fn batch_record(
        &self,
        person: &Person,
        cycle: &CycleHandle,
        batch_index: u32,
        batch: &DiscordBatch,
    ) -> Result<PendingRequest, AdapterError> {
        Ok(PendingRequest {
            owner: cycle.owner().to_string(),
            cycle: cycle.cycle().seq(),
            person: person.name.clone(),
            batch_index,
            channel: "discord".to_string(),
            payload: serde_json::to_value(batch)
                .map_err(|e| AdapterError::Transport(e.to_string()))?,
        })
    }
}

#[async_trait]
impl ChannelAdapter for DiscordAdapter {
    async fn request(&self, person: &Person, cycle: &CycleHandle) -> Result<(), AdapterError> {
        self.session()?;
        let store = cycle.store();
        store
            .seed_labels(&person.name, cycle.labels().iter().copied())
            .await;

        let channel_id = self.create_dm(&person.channel_id).await?;
        self.send_message(&channel_id, &request_header(cycle.title()))
            .await?;

        let batches = format::batches(cycle.labels());
        let remaining = Arc::new(AtomicUsize::new(batches.len()));

        for (i, dates) in batches.into_iter().enumerate() {
            let message_id = self
                .send_message(&channel_id, &request_body(&dates))
                .await?;

            for j in 0..dates.len() {
                self.add_reaction(&channel_id, &message_id, format::EMOJIS[j])
                    .await?;
            }
            self.add_reaction(&channel_id, &message_id, format::NONE_EMOJI)
                .await?;

            let batch = DiscordBatch {
                channel_id: channel_id.clone(),
                message_id,
                dates,
            };
            cycle
                .pending()
                .save(self.batch_record(person, cycle, i as u32, &batch)?)
                .await?;

            let adapter = self.clone();
            let name = person.name.clone();
            let cycle = cycle.clone();
            let remaining = Arc::clone(&remaining);
            tokio::spawn(async move {
                adapter.poll_batch(name.clone(), cycle.clone(), batch).await;
                // Last batch poller out signals the person's completion.
                if remaining.fetch_sub(1, Ordering::SeqCst) == 1 {
                    cycle.complete(&name);
                }
            });
        }

        debug!(person = %person.name, "discord prompts sent");
        Ok(())
    }

    async fn gather(&self, person: &Person, cycle: &CycleHandle) -> Result<(), AdapterError> {
        self.session()?;
        let records = cycle.pending().find(cycle.owner(), &person.name).await?;
        if records.is_empty() {
            return Ok(());
        }

        // A restarted process has no map yet; cover the recorded dates
        // without clobbering anything a live poller already wrote.
        for record in &records {
            let batch: DiscordBatch = serde_json::from_value(record.payload.clone())
                .map_err(|e| AdapterError::Transport(e.to_string()))?;
            cycle
                .store()
                .ensure_labels(&person.name, batch.dates.iter().copied())
                .await;
        }

        for (i, record) in records.iter().enumerate() {
            let batch: DiscordBatch = serde_json::from_value(record.payload.clone())
                .map_err(|e| AdapterError::Transport(e.to_string()))?;

            let none_count = self
                .reaction_count(&batch.channel_id, &batch.message_id, format::NONE_EMOJI)
                .await?;
            if none_count >= REACTED {
                // An "all unavailable" answer short-circuits later batches.
                cycle.store().reset(&person.name).await;
                for leftover in &records[i..] {
                    cycle.pending().delete(leftover).await?;
                }
                return Ok(());
            }

            for (j, &date) in batch.dates.iter().enumerate() {
                let count = self
                    .reaction_count(&batch.channel_id, &batch.message_id, format::EMOJIS[j])
                    .await?;
                cycle
                    .store()
                    .set(&person.name, date, count >= REACTED)
                    .await;
            }
            cycle.pending().delete(record).await?;
        }

        debug!(person = %person.name, "discord gather finished");
        Ok(())
    }

    async fn respond(
        &self,
        person: &Person,
        cycle: &CycleHandle,
        outcome: &Outcome,
    ) -> Result<(), AdapterError> {
        self.session()?;
        let channel_id = self.create_dm(&person.channel_id).await?;
        self.send_message(&channel_id, &response_message(cycle.title(), outcome))
            .await?;
        Ok(())
    }
}

fn request_header(title: &str) -> String {
    format!("⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜\n\n**Schedule for {title}**")
}

fn request_body(dates: &[DateLabel]) -> String {
    let mut emoji_dates = String::new();
    for (j, date) in dates.iter().enumerate() {
        emoji_dates.push_str(&format!("{} - {}\n", format::EMOJIS[j], date));
    }
    format!(
        "{emoji_dates}{} - None\n\nReact with the corresponding emoji for dates you are free\n",
        format::NONE_EMOJI
    )
}

fn response_message(title: &str, outcome: &Outcome) -> String {
    format!(
        "⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜\n\n**Schedule results for {title}**\n{}\n\n{}{}⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜⬜\n",
        format::fraction(outcome),
        format::day_lines(outcome),
        format::unknown_block(outcome),
    )
}

// REST response shapes (only the fields we read)

#[derive(Debug, Deserialize)]
struct DmChannel {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Message {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ReactionUser {
    #[allow(dead_code)]
    id: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use freeday_domain::Day;

    fn label(day: u32) -> DateLabel {
        DateLabel::new(NaiveDate::from_ymd_opt(2023, 1, day).unwrap())
    }

    #[test]
    fn test_request_body_lists_emoji_date_pairs() {
        let body = request_body(&[label(2), label(3)]);
        assert!(body.starts_with("1️⃣ - Monday 01/02\n2️⃣ - Tuesday 01/03\n"));
        assert!(body.contains("❌ - None"));
        assert!(body.contains("React with the corresponding emoji"));
    }

    #[test]
    fn test_response_message_shape() {
        let outcome = Outcome {
            days: vec![Day {
                label: label(2),
                people: vec!["alice".to_string(), "bob".to_string()],
            }],
            unknowns: vec!["carol".to_string()],
            quorum: 2,
            roster_size: 3,
        };

        let message = response_message("Game Night", &outcome);
        assert!(message.contains("**Schedule results for Game Night**"));
        assert!(message.contains("2/3 people available"));
        assert!(message.contains("- Monday 01/02 (alice, bob)"));
        assert!(message.contains("No responses from:\n- carol"));
    }

    #[test]
    fn test_batch_payload_round_trip() {
        let batch = DiscordBatch {
            channel_id: "123".to_string(),
            message_id: "456".to_string(),
            dates: vec![label(2), label(3)],
        };

        let value = serde_json::to_value(&batch).unwrap();
        let back: DiscordBatch = serde_json::from_value(value).unwrap();
        assert_eq!(back.channel_id, "123");
        assert_eq!(back.dates, vec![label(2), label(3)]);
    }
}
