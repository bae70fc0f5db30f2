//! Browser capability consumed by the scenarios, plus the shared signup
//! helpers built on top of it.

use async_trait::async_trait;
use signup_probe_common::{only_digits, LocaleContext, WaitPolicy};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};
use crate::form::SignupForm;

/// Element query and interaction primitives.
///
/// Implementations report the page's network traffic to the
/// `TrafficRecorder` they were opened with.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn goto(&self, url: &str) -> E2eResult<()>;

    async fn current_url(&self) -> E2eResult<String>;

    /// Clear the field, then type `text` key by key.
    async fn clear_and_type(&self, selector: &str, text: &str) -> E2eResult<()>;

    /// Click `clicks` times in rapid succession.
    async fn click(&self, selector: &str, clicks: u32) -> E2eResult<()>;

    /// Click the first `tag` element whose text contains `text`, skipping
    /// actionability checks.
    async fn click_text(&self, tag: &str, text: &str) -> E2eResult<()>;

    /// Check a checkbox, skipping actionability checks.
    async fn check(&self, selector: &str) -> E2eResult<()>;

    async fn focus(&self, selector: &str) -> E2eResult<()>;

    /// Move focus away by clicking the page body's top-left corner.
    async fn blur(&self) -> E2eResult<()>;

    async fn input_value(&self, selector: &str) -> E2eResult<String>;

    async fn text_content(&self, selector: &str) -> E2eResult<String>;

    async fn is_visible(&self, selector: &str) -> E2eResult<bool>;

    /// Whether any visible element on the page contains `text`.
    async fn has_visible_text(&self, text: &str) -> E2eResult<bool>;

    /// Whether an ancestor of `selector` shows `text`.
    async fn has_text_near(&self, selector: &str, text: &str) -> E2eResult<bool>;

    async fn remove_attribute(&self, selector: &str, name: &str) -> E2eResult<()>;

    async fn close(&self) -> E2eResult<()>;
}

/// Navigate to the signup page, dismiss the cookie notice and switch to the
/// active language when it is not the page default.
pub async fn init_signup(
    browser: &dyn BrowserSession,
    locale: &LocaleContext,
    form: &SignupForm,
) -> E2eResult<()> {
    let ui = locale.active();
    let url = ui.require("urls.signup")?;
    info!("Opening signup page {}", url);

    browser.goto(url).await?;
    browser.click_text("button", ui.require("buttons.acceptCookies")?).await?;

    if !locale.is_default() {
        debug!("Switching page language to {}", ui.locale());
        toggle_language(browser, form).await?;
    }
    Ok(())
}

/// Flip the page language in place. The toggle is a link that would open a
/// new tab, so its `target` is stripped first.
pub async fn toggle_language(browser: &dyn BrowserSession, form: &SignupForm) -> E2eResult<()> {
    browser.remove_attribute(&form.language_toggle, "target").await?;
    browser.click(&form.language_toggle, 1).await
}

/// Focus a field, blur it, and expect the required-field message next to it.
pub async fn expect_required_field(
    browser: &dyn BrowserSession,
    selector: &str,
    required_text: &str,
) -> E2eResult<()> {
    if !browser.is_visible(selector).await? {
        return Err(E2eError::expectation(
            format!("{} is visible", selector),
            "field not visible",
        ));
    }
    browser.focus(selector).await?;
    browser.blur().await?;

    if browser.has_text_near(selector, required_text).await? {
        Ok(())
    } else {
        Err(E2eError::expectation(
            format!("{} shows {:?} when left empty", selector, required_text),
            "no required message near the field",
        ))
    }
}

/// The digits currently in a field, e.g. `5141234567` from `(514) 123-4567`.
pub async fn strip_digits(browser: &dyn BrowserSession, selector: &str) -> E2eResult<String> {
    let value = browser.input_value(selector).await?;
    Ok(only_digits(&value))
}

/// Type into a field, then move focus away so its validation runs.
pub async fn type_and_blur(browser: &dyn BrowserSession, selector: &str, text: &str) -> E2eResult<()> {
    browser.clear_and_type(selector, text).await?;
    browser.focus(selector).await?;
    browser.blur().await
}

/// Poll until `text` is visible somewhere on the page or the policy times out.
pub async fn wait_for_visible_text(
    browser: &dyn BrowserSession,
    text: &str,
    policy: &WaitPolicy,
) -> E2eResult<bool> {
    let found = poll_until(policy, move || browser.has_visible_text(text)).await?;
    if !found {
        debug!("{:?} not visible after {:?}", text, policy.timeout);
    }
    Ok(found)
}

/// Expect `selector` to become visible within the policy's timeout.
pub async fn expect_visible(
    browser: &dyn BrowserSession,
    selector: &str,
    expectation: &str,
    policy: &WaitPolicy,
) -> E2eResult<()> {
    if poll_until(policy, move || browser.is_visible(selector)).await? {
        Ok(())
    } else {
        Err(E2eError::expectation(
            expectation,
            format!("{} not visible after {:?}", selector, policy.timeout),
        ))
    }
}

/// Expect `selector` to be absent or hidden within the policy's timeout.
pub async fn expect_hidden(
    browser: &dyn BrowserSession,
    selector: &str,
    expectation: &str,
    policy: &WaitPolicy,
) -> E2eResult<()> {
    let hidden = poll_until(policy, move || async move {
        Ok(!browser.is_visible(selector).await?)
    })
    .await?;
    if hidden {
        Ok(())
    } else {
        Err(E2eError::expectation(
            expectation,
            format!("{} still visible after {:?}", selector, policy.timeout),
        ))
    }
}

async fn poll_until<F, Fut>(policy: &WaitPolicy, mut check: F) -> E2eResult<bool>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<bool>>,
{
    let start = Instant::now();
    let mut interval = policy.initial_interval;

    loop {
        if check().await? {
            return Ok(true);
        }
        let elapsed = start.elapsed();
        if elapsed >= policy.timeout {
            return Ok(false);
        }
        tokio::time::sleep(interval.min(policy.timeout - elapsed)).await;
        interval = interval.saturating_mul(2).min(policy.max_interval);
    }
}
