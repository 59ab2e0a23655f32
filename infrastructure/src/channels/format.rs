//! Shared prompt and result formatting
//!
//! Prompts enumerate a cycle's dates in batches of up to seven: one batch
//! per message or poll, since both Discord's reaction row and a readable
//! Telegram poll top out around there.

use freeday_domain::{DateLabel, Outcome};

/// Reaction emojis offered per batch, in date order.
pub const EMOJIS: [&str; 7] = ["1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣", "6️⃣", "7️⃣"];

/// The "no dates work for me" reaction.
pub const NONE_EMOJI: &str = "❌";

/// Maximum dates per prompt batch.
pub const BATCH_SIZE: usize = 7;

/// Split a window's labels into prompt batches.
pub fn batches(labels: &[DateLabel]) -> Vec<Vec<DateLabel>> {
    labels.chunks(BATCH_SIZE).map(<[DateLabel]>::to_vec).collect()
}

/// `"- Monday 01/02 (alice, bob)"` lines for the qualifying days.
pub fn day_lines(outcome: &Outcome) -> String {
    outcome
        .days
        .iter()
        .map(|day| format!("- {} ({})\n", day.label, day.people.join(", ")))
        .collect()
}

/// The `"No responses from:"` block, or nothing when everyone answered.
pub fn unknown_block(outcome: &Outcome) -> String {
    if outcome.unknowns.is_empty() {
        return String::new();
    }
    let mut block = String::from("\nNo responses from:\n");
    for name in &outcome.unknowns {
        block.push_str(&format!("- {name}\n"));
    }
    block
}

/// `"2/3 people available"`.
pub fn fraction(outcome: &Outcome) -> String {
    format!("{}/{} people available", outcome.quorum, outcome.roster_size)
}
