//! Poll detection and answering
//!
//! Best-effort probing of the WebClicker page markup: a text marker tells us
//! no poll is running, a selector plus a button-label scan tell us one is.
//! Everything here fails safe: a DOM error means "no poll" and an empty
//! choice list, never a crashed loop.

use rand::Rng;
use tracing::{error, info, warn};

use crate::browser::{BrowserError, DomHandle, DomQuery};

/// Poll page probes
mod selectors {
    /// Text the page shows while no poll is running.
    pub const NO_POLL_MARKER: &str = "No current poll";

    /// Explicit answer-choice markers.
    pub const ANSWER_CHOICES: &str =
        "button[data-choice], .answer-option, button[class*='answer']";

    /// Attribute carrying the choice label when the markup provides one.
    pub const CHOICE_ATTR: &str = "data-choice";
}

/// One clickable answer option with its label.
pub struct Choice<H> {
    pub handle: H,
    pub label: String,
}

/// Check whether a poll is currently active.
///
/// The "No current poll" marker wins over everything else; without it, either
/// an answer-choice selector hit or a button carrying a recognized label
/// counts as active. Inspection failures are logged and read as inactive so
/// an uncertain page state never triggers a click.
pub async fn poll_active<D: DomQuery>(dom: &D, labels: &[String]) -> bool {
    match poll_active_inner(dom, labels).await {
        Ok(active) => active,
        Err(e) => {
            error!("Error checking for active poll: {e}");
            false
        }
    }
}

async fn poll_active_inner<D: DomQuery>(dom: &D, labels: &[String]) -> Result<bool, BrowserError> {
    let no_poll = dom
        .find_by_text_contains(selectors::NO_POLL_MARKER)
        .await?;
    if !no_poll.is_empty() {
        return Ok(false);
    }

    let marked = dom.find_by_selector(selectors::ANSWER_CHOICES).await?;
    if !marked.is_empty() {
        return Ok(true);
    }

    for button in dom.find_by_tag("button").await? {
        let text = button.text().await?;
        if labels.iter().any(|label| label == text.trim()) {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Enumerate the clickable answer choices of the current poll.
///
/// Primary strategy: the answer-choice selector, labelling each hit from its
/// `data-choice` attribute or its trimmed text. Fallback, used only when the
/// primary yields nothing: keep buttons whose trimmed text is one of the
/// recognized labels. Empty labels are dropped; failures yield an empty list.
pub async fn answer_choices<D: DomQuery>(dom: &D, labels: &[String]) -> Vec<Choice<D::Handle>> {
    match answer_choices_inner(dom, labels).await {
        Ok(choices) => {
            info!("Found {} answer choices", choices.len());
            choices
        }
        Err(e) => {
            error!("Error getting answer choices: {e}");
            Vec::new()
        }
    }
}

async fn answer_choices_inner<D: DomQuery>(
    dom: &D,
    labels: &[String],
) -> Result<Vec<Choice<D::Handle>>, BrowserError> {
    let mut choices = Vec::new();

    let marked = dom.find_by_selector(selectors::ANSWER_CHOICES).await?;
    if marked.is_empty() {
        for button in dom.find_by_tag("button").await? {
            let text = button.text().await?;
            let trimmed = text.trim();
            if labels.iter().any(|label| label == trimmed) {
                choices.push(Choice {
                    label: trimmed.to_string(),
                    handle: button,
                });
            }
        }
    } else {
        for element in marked {
            let label = match element.attribute(selectors::CHOICE_ATTR).await? {
                Some(value) if !value.is_empty() => value,
                _ => element.text().await?.trim().to_string(),
            };
            if !label.is_empty() {
                choices.push(Choice {
                    handle: element,
                    label,
                });
            }
        }
    }

    Ok(choices)
}

/// Pick one choice uniformly at random and click it.
///
/// Returns whether a selection attempt was made. An empty list logs and
/// no-ops; a failed click is logged and the loop carries on.
pub async fn click_random<H: DomHandle>(choices: &[Choice<H>]) -> bool {
    if choices.is_empty() {
        warn!("No answer choices available");
        return false;
    }

    let index = rand::thread_rng().gen_range(0..choices.len());
    let choice = &choices[index];
    info!("Randomly selected answer: {}", choice.label);

    match choice.handle.click().await {
        Ok(()) => info!("Successfully clicked answer {}", choice.label),
        Err(e) => error!("Error selecting answer choice: {e}"),
    }
    true
}
