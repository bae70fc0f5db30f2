//! Scenario flows
//!
//! Each flow records all POST traffic for its duration, identifies the
//! account-creation exchange by the email it typed, and asserts on that
//! exchange rather than on the order of traffic.

use chrono::Utc;
use signup_probe_common::{Exchange, Predicate, Scope, SignupRecord};
use tracing::{info, warn};

use crate::browser::{
    expect_hidden, expect_required_field, expect_visible, strip_digits, type_and_blur,
    wait_for_visible_text,
};
use crate::driver::{ScenarioDriver, SettlePolicy};
use crate::error::{E2eError, E2eResult};
use crate::expect::{expect_count, expect_digits, expect_first, expect_none, expect_payload_contains};
use crate::form::{FormData, FormField};
use crate::scenario::ScenarioContext;

const VALID_FIXTURE: &str = "signup-valid";
const DUPLICATE_FIXTURE: &str = "signup-duplicate";

/// Fixtures the catalog reads; the runner refuses to start without them.
pub(crate) const REQUIRED_FIXTURES: [&str; 2] = [VALID_FIXTURE, DUPLICATE_FIXTURE];

const OVERLONG_PHONE: &str = "123456789012345";
const PHONE_DIGITS: usize = 10;

/// A 201 whose request or response mentions `email`.
pub fn account_created(email: &str) -> Predicate {
    Predicate::status(201).and(Predicate::contains(Scope::Either, email))
}

/// A 409, or any other non-201 answer, to a POST mentioning `email`.
pub fn account_rejected(email: &str) -> Predicate {
    Predicate::status(409)
        .or(Predicate::status_not(201))
        .and(Predicate::contains(Scope::Either, email))
}

pub(crate) async fn create_account(
    ctx: &ScenarioContext<'_>,
    clicks: u32,
    toggle_language: bool,
) -> E2eResult<()> {
    let record = ctx.fixtures.signup(VALID_FIXTURE)?;
    let email = record.unique_email(Utc::now());
    info!("Creating account {} ({} click(s))", email, clicks);

    let mut driver = ScenarioDriver::start(ctx.browser, ctx.recorder, ctx.form);
    driver.populate(&FormData::from_record(&record, &email)).await?;

    let typed_phone = strip_digits(ctx.browser, &FormField::Phone.selector()).await?;
    if typed_phone != record.phone_digits {
        return Err(E2eError::expectation(
            "phone field holds the typed digits",
            format!("expected {}, field has {}", record.phone_digits, typed_phone),
        ));
    }
    expect_default_province(ctx).await?;

    if toggle_language {
        driver.toggle_language().await?;
    }
    driver.submit(clicks).await?;

    let created = account_created(&email);
    driver.settle(&until(ctx, created.clone())).await?;
    driver.assert(|buffer| {
        let exchange = expect_first(buffer, &created, "found account-creation POST with 201")?;
        expect_count(buffer, &created, 1, "number of account creation POSTs")?;
        expect_echoed(exchange, &record, &email)
    })?;

    driver.finish();
    Ok(())
}

pub(crate) async fn trimmed_field(ctx: &ScenarioContext<'_>, field: FormField) -> E2eResult<()> {
    let record = ctx.fixtures.signup(VALID_FIXTURE)?;
    let email = record.unique_email(Utc::now());

    let (typed, trimmed) = match field {
        FormField::FirstName => (
            "         MyFirstName         ".to_string(),
            "MyFirstName".to_string(),
        ),
        FormField::LastName => (
            "        MyLastName        ".to_string(),
            "MyLastName".to_string(),
        ),
        FormField::Email => (format!("                {}", email), email.clone()),
        other => {
            return Err(E2eError::Config(format!(
                "no trimming scenario for the {} field",
                other
            )))
        }
    };

    let mut driver = ScenarioDriver::start(ctx.browser, ctx.recorder, ctx.form);
    driver
        .populate(&FormData::from_record(&record, &email).with(field, typed))
        .await?;
    expect_default_province(ctx).await?;
    driver.submit(1).await?;

    let created = account_created(&email);
    driver.settle(&until(ctx, created.clone())).await?;
    driver.assert(|buffer| {
        let exchange = expect_first(buffer, &created, "found account-creation POST with 201")?;
        expect_payload_contains(exchange, Scope::Request, &trimmed)?;

        let padded = Predicate::contains(Scope::Either, &format!(" {}", trimmed))
            .or(Predicate::contains(Scope::Either, &format!("{} ", trimmed)));
        expect_none(
            std::slice::from_ref(exchange),
            &padded,
            &format!("{} is posted without surrounding spaces", field),
        )
    })?;

    driver.finish();
    Ok(())
}

pub(crate) async fn duplicate_account(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let record = ctx.fixtures.signup(DUPLICATE_FIXTURE)?;
    let email = record.fixed_email();
    let account_exists = ctx.locale.active().require("errors.accountExists")?;

    let mut driver = ScenarioDriver::start(ctx.browser, ctx.recorder, ctx.form);
    driver.populate(&FormData::from_record(&record, &email)).await?;
    expect_default_province(ctx).await?;
    driver.submit(1).await?;

    let rejected = account_rejected(&email);
    driver.settle(&until(ctx, rejected.clone())).await?;
    driver.assert(|buffer| {
        let exchange = expect_first(buffer, &rejected, "409 Response found, no 201")?;
        if exchange.status != Some(409) {
            warn!(
                "Duplicate signup for {} rejected with {:?} instead of 409",
                email, exchange.status
            );
        }
        expect_none(buffer, &account_created(&email), "There should be no 201 POSTs")
    })?;

    if !wait_for_visible_text(ctx.browser, account_exists, &ctx.settle.wait_policy()).await? {
        return Err(E2eError::expectation(
            format!("{:?} is visible", account_exists),
            "duplicate account message never appeared",
        ));
    }

    driver.finish();
    Ok(())
}

pub(crate) async fn empty_form_not_posted(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let mut driver = ScenarioDriver::start(ctx.browser, ctx.recorder, ctx.form);
    let initial_url = ctx.browser.current_url().await?;

    driver.populate(&FormData::empty()).await?;
    driver.submit(1).await?;

    let current_url = ctx.browser.current_url().await?;
    if current_url != initial_url {
        return Err(E2eError::expectation(
            "URL unchanged after submitting an empty form",
            format!("{} -> {}", initial_url, current_url),
        ));
    }

    driver
        .settle(&SettlePolicy::Fixed(ctx.settle.quiet_window()))
        .await?;
    driver.assert(|buffer| expect_none(buffer, &Predicate::status(201), "There should be no 201 POSTs"))?;

    driver.finish();
    Ok(())
}

pub(crate) async fn missing_consent_not_posted(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let record = ctx.fixtures.signup(VALID_FIXTURE)?;
    let email = record.unique_email(Utc::now());

    let mut driver = ScenarioDriver::start(ctx.browser, ctx.recorder, ctx.form);
    driver
        .populate(&FormData::from_record(&record, &email).without_consent())
        .await?;
    expect_default_province(ctx).await?;
    driver.submit(1).await?;

    driver
        .settle(&SettlePolicy::Fixed(ctx.settle.quiet_window()))
        .await?;
    driver.assert(|buffer| expect_none(buffer, &Predicate::status(201), "There should be no 201 POSTs"))?;

    driver.finish();
    Ok(())
}

pub(crate) async fn required_fields(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let required = ctx.locale.active().require("errors.required")?;
    for field in FormField::ALL {
        expect_required_field(ctx.browser, &field.id_selector(), required).await?;
    }
    Ok(())
}

/// The phone input drops every digit past the tenth without complaining.
pub(crate) async fn phone_digit_cap(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let phone = FormField::Phone.selector();
    type_and_blur(ctx.browser, &phone, OVERLONG_PHONE).await?;

    let kept = strip_digits(ctx.browser, &phone).await?;
    let expected = &OVERLONG_PHONE[..PHONE_DIGITS];
    if kept != expected {
        return Err(E2eError::expectation(
            "phone keeps only the first 10 digits",
            format!("expected {}, field has {}", expected, kept),
        ));
    }

    expect_hidden(
        ctx.browser,
        &ctx.form.field_error_for(FormField::Phone),
        "no error shown for an over-long phone",
        &ctx.settle.wait_policy(),
    )
    .await
}

pub(crate) async fn too_long_field(ctx: &ScenarioContext<'_>, field: FormField) -> E2eResult<()> {
    let too_many = ctx.locale.active().require("errors.tooManyChars")?;
    let typed = match field {
        FormField::FirstName | FormField::LastName => "Bartholomew".repeat(8),
        FormField::Email => format!("s{}@long.com", "o".repeat(400)),
        other => {
            return Err(E2eError::Config(format!(
                "no length limit scenario for the {} field",
                other
            )))
        }
    };
    type_and_blur(ctx.browser, &field.selector(), &typed).await?;

    let policy = ctx.settle.wait_policy();
    let expectation = format!("{} shows {:?}", field, too_many);

    // The email message is not rendered inside the field's error container.
    if field == FormField::Email {
        return if wait_for_visible_text(ctx.browser, too_many, &policy).await? {
            Ok(())
        } else {
            Err(E2eError::expectation(
                expectation,
                format!("{} characters accepted silently", typed.len()),
            ))
        };
    }

    let message = ctx.form.too_long_error_for(field);
    expect_visible(ctx.browser, &message, &expectation, &policy).await?;
    let shown = ctx.browser.text_content(&message).await?;
    if shown.contains(too_many) {
        Ok(())
    } else {
        Err(E2eError::expectation(expectation, format!("message reads {:?}", shown)))
    }
}

pub(crate) async fn invalid_email(ctx: &ScenarioContext<'_>, typed: &str) -> E2eResult<()> {
    let invalid = ctx.locale.active().require("errors.invalidEmail")?;
    type_and_blur(ctx.browser, &FormField::Email.selector(), typed).await?;

    if wait_for_visible_text(ctx.browser, invalid, &ctx.settle.wait_policy()).await? {
        Ok(())
    } else {
        Err(E2eError::expectation(
            format!("{:?} is rejected with {:?}", typed, invalid),
            "no invalid email message",
        ))
    }
}

/// Weak passwords raise the complexity warning on blur; strong ones never do.
pub(crate) async fn password_strength(
    ctx: &ScenarioContext<'_>,
    password: &str,
    weak: bool,
) -> E2eResult<()> {
    type_and_blur(ctx.browser, &FormField::Password.selector(), password).await?;

    let warning = &ctx.form.weak_password_error;
    let policy = ctx.settle.wait_policy();
    if weak {
        let expectation = format!("{:?} is flagged as too weak", password);
        expect_visible(ctx.browser, warning, &expectation, &policy).await
    } else {
        let expectation = format!("{:?} passes the strength rules", password);
        expect_hidden(ctx.browser, warning, &expectation, &policy).await
    }
}

pub(crate) async fn mismatched_passwords(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    type_and_blur(ctx.browser, &FormField::Password.selector(), "GoodPass1234").await?;
    type_and_blur(ctx.browser, &FormField::PasswordConfirm.selector(), "WrongPass1234").await?;

    expect_visible(
        ctx.browser,
        &ctx.form.password_mismatch_error,
        "passwords must match message is visible",
        &ctx.settle.wait_policy(),
    )
    .await
}

fn until(ctx: &ScenarioContext<'_>, predicate: Predicate) -> SettlePolicy {
    SettlePolicy::UntilMatch {
        predicate,
        wait: ctx.settle.wait_policy(),
        grace: ctx.settle.grace(),
    }
}

/// The province selector shows Quebec before anything is submitted.
async fn expect_default_province(ctx: &ScenarioContext<'_>) -> E2eResult<()> {
    let expected = ctx.locale.active().require("provinces.QC")?;
    let selector = &ctx.form.province_value;

    if !ctx.browser.is_visible(selector).await? {
        return Err(E2eError::expectation(
            "province selector is visible",
            selector.clone(),
        ));
    }
    let shown = ctx.browser.text_content(selector).await?;
    if shown.trim() != expected {
        return Err(E2eError::expectation(
            "province defaults to Quebec",
            format!("expected {:?}, shows {:?}", expected, shown),
        ));
    }
    Ok(())
}

/// The response echoes back every submitted value. Phone numbers may be
/// reformatted by the backend, so they are compared digit by digit.
fn expect_echoed(exchange: &Exchange, record: &SignupRecord, email: &str) -> E2eResult<()> {
    expect_payload_contains(exchange, Scope::Response, &record.first_name)?;
    expect_payload_contains(exchange, Scope::Response, &record.last_name)?;
    expect_payload_contains(exchange, Scope::Response, email)?;
    expect_digits(exchange, Scope::Response, &record.phone_digits)?;
    expect_payload_contains(exchange, Scope::Response, &record.province_value)
}
