//! Human-like input pacing.
//!
//! Engines fingerprint input cadence as well as browser internals, so query
//! text is typed character by character with variable delays and the
//! occasional corrected typo, and every interaction is padded with
//! randomized pauses.

use crate::page::Page;
use geowatch_core::Result;
use std::time::Duration;

/// WebDriver key code for Backspace.
pub const BACKSPACE: &str = "\u{E003}";

const TYPO_RATIO: f64 = 0.03;

fn range_ms(min_ms: u64, max_ms: u64) -> Duration {
    let mut rng = rand::rng();
    let ms = rand::Rng::random_range(&mut rng, min_ms..=max_ms.max(min_ms));
    Duration::from_millis(ms)
}

/// Sleep between `min_ms` and `max_ms` milliseconds.
pub async fn random_delay(min_ms: u64, max_ms: u64) {
    tokio::time::sleep(range_ms(min_ms, max_ms)).await;
}

/// A pre-interaction pause in the 100–2000 ms band.
pub async fn interaction_pause() {
    random_delay(100, 2000).await;
}

/// Scroll a reader-sized amount and idle briefly.
pub async fn natural_scroll(page: &dyn Page) -> Result<()> {
    let amount = {
        let mut rng = rand::rng();
        rand::Rng::random_range(&mut rng, 100..=500u32)
    };
    page.execute_js(&format!("window.scrollBy(0, {amount}); return true;"))
        .await?;
    random_delay(500, 1500).await;
    Ok(())
}

/// Drift the cursor to a random viewport point.
pub async fn wander_cursor(page: &dyn Page) -> Result<()> {
    let (x, y) = {
        let mut rng = rand::rng();
        (
            rand::Rng::random_range(&mut rng, 0..1280u32),
            rand::Rng::random_range(&mut rng, 0..720u32),
        )
    };
    page.execute_js(&format!(
        "document.dispatchEvent(new MouseEvent('mousemove', {{clientX: {x}, clientY: {y}, bubbles: true}})); return true;"
    ))
    .await?;
    random_delay(100, 300).await;
    Ok(())
}

fn sample_typo() -> Option<char> {
    let mut rng = rand::rng();
    if rand::Rng::random_bool(&mut rng, TYPO_RATIO) {
        let idx = rand::Rng::random_range(&mut rng, 0..26u32);
        char::from_u32('a' as u32 + idx)
    } else {
        None
    }
}

/// Type `text` into the element at `selector` one character at a time,
/// 30–150 ms per character, with a ~3 % chance of a typo that gets
/// backspaced away. Returns false when the element is absent.
pub async fn type_text(page: &dyn Page, selector: &str, text: &str) -> Result<bool> {
    if !page.click(selector).await? {
        return Ok(false);
    }
    random_delay(100, 300).await;

    for ch in text.chars() {
        if let Some(typo) = sample_typo() {
            page.send_keys(selector, &typo.to_string()).await?;
            random_delay(50, 150).await;
            page.send_keys(selector, BACKSPACE).await?;
            random_delay(50, 150).await;
        }
        page.send_keys(selector, &ch.to_string()).await?;
        random_delay(30, 150).await;
    }
    Ok(true)
}
