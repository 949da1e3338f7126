use std::collections::{BTreeMap, HashSet};

use url::Url;

use crate::extract::ExtractPath;
use crate::template::{parse_iterate, parse_template, validate_json_templates};
use crate::types::{
    BreakerSpec, PhaseSpec, Playbook, RateLimitSpec, RequestSpec, RetrySpec, SessionSpec, StepSpec,
};
use crate::validate::{Validator, HEADER_RE, NAME_RE};

pub(crate) fn validate_playbook(v: &mut Validator, playbook: &Playbook) {
    if playbook.phases.is_empty() {
        v.push("phases", "must have at least one entry");
    }

    for (name, session) in &playbook.sessions {
        let path = format!("sessions.{name}");
        if !NAME_RE.is_match(name) {
            v.push(&path, "session name must match regex [A-Za-z0-9_\\-]+");
        }
        validate_session(v, session, &path);
    }

    let mut phase_names = HashSet::<&str>::new();
    for (idx, phase) in playbook.phases.iter().enumerate() {
        let path = format!("phases[{idx}]");
        if !NAME_RE.is_match(&phase.name) {
            v.push(format!("{path}.name"), "must match regex [A-Za-z0-9_\\-]+");
        }
        if !phase_names.insert(phase.name.as_str()) {
            v.push(format!("{path}.name"), "must be unique within the playbook");
        }
        validate_phase(v, phase, &path, &playbook.sessions);
    }
}

fn validate_session(v: &mut Validator, session: &SessionSpec, path: &str) {
    match Url::parse(&session.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => v.push(
            format!("{path}.base_url"),
            format!("unsupported scheme '{}' (expected http or https)", url.scheme()),
        ),
        Err(e) => v.push(format!("{path}.base_url"), format!("not a valid URL: {e}")),
    }

    if let Some(timeout) = session.timeout_seconds {
        validate_timeout(v, &format!("{path}.timeout_seconds"), timeout);
    }
    if let Some(retry) = &session.retry {
        validate_retry(v, retry, &format!("{path}.retry"));
    }
    if let Some(breaker) = &session.circuit_breaker {
        validate_breaker(v, breaker, &format!("{path}.circuit_breaker"));
    }
    if let Some(rate_limit) = &session.rate_limit {
        validate_rate_limit(v, rate_limit, &format!("{path}.rate_limit"));
    }
}

fn validate_phase(
    v: &mut Validator,
    phase: &PhaseSpec,
    path: &str,
    sessions: &BTreeMap<String, SessionSpec>,
) {
    if phase.steps.is_empty() {
        v.push(format!("{path}.steps"), "must have at least one entry");
    }

    let mut step_names = HashSet::<&str>::new();
    for (idx, step) in phase.steps.iter().enumerate() {
        let spath = format!("{path}.steps[{idx}]");
        if !NAME_RE.is_match(&step.name) {
            v.push(format!("{spath}.name"), "must match regex [A-Za-z0-9_\\-]+");
        }
        if !step_names.insert(step.name.as_str()) {
            v.push(format!("{spath}.name"), "must be unique within the phase");
        }
        validate_step(v, step, &spath, sessions);
    }
}

fn validate_step(
    v: &mut Validator,
    step: &StepSpec,
    path: &str,
    sessions: &BTreeMap<String, SessionSpec>,
) {
    if !sessions.contains_key(&step.session) {
        v.push(
            format!("{path}.session"),
            format!("references undeclared session '{}'", step.session),
        );
    }

    if let Some(clause) = &step.iterate {
        if let Err(e) = parse_iterate(clause) {
            v.push(format!("{path}.iterate"), e.to_string());
        }
    }

    validate_request(v, &step.request, &format!("{path}.request"));

    for (target, extract) in &step.store {
        let spath = format!("{path}.store.{target}");
        let name = target.strip_suffix('+').unwrap_or(target);
        if name.is_empty() {
            v.push(&spath, "variable name must not be empty");
        } else if let Err(e) = parse_template(name) {
            v.push(&spath, format!("invalid variable name template: {e}"));
        }
        if let Err(e) = ExtractPath::parse(extract) {
            v.push(&spath, e.to_string());
        }
    }

    if let Some(timeout) = step.timeout_seconds {
        validate_timeout(v, &format!("{path}.timeout_seconds"), timeout);
    }
    if let Some(retry) = &step.retry {
        validate_retry(v, retry, &format!("{path}.retry"));
    }
    if let Some(breaker) = &step.circuit_breaker {
        validate_breaker(v, breaker, &format!("{path}.circuit_breaker"));
    }
    if let Some(rate_limit) = &step.rate_limit {
        validate_rate_limit(v, rate_limit, &format!("{path}.rate_limit"));
    }
}

fn validate_request(v: &mut Validator, request: &RequestSpec, path: &str) {
    if let Err(e) = parse_template(&request.endpoint) {
        v.push(format!("{path}.endpoint"), e.to_string());
    }

    for (name, value) in &request.headers {
        let hpath = format!("{path}.headers.{name}");
        if !HEADER_RE.is_match(name) {
            v.push(&hpath, "not a valid header name");
        }
        if let Err(e) = parse_template(value) {
            v.push(&hpath, e.to_string());
        }
    }

    for (name, value) in &request.params {
        let ppath = format!("{path}.params.{name}");
        if name.is_empty() {
            v.push(&ppath, "parameter name must not be empty");
        }
        if let Err(e) = parse_template(value) {
            v.push(&ppath, e.to_string());
        }
    }

    if let Some(body) = &request.body {
        if let Err(e) = validate_json_templates(body) {
            v.push(format!("{path}.body"), e.to_string());
        }
    }
}

fn validate_retry(v: &mut Validator, retry: &RetrySpec, path: &str) {
    if !retry.backoff_factor.is_finite() || retry.backoff_factor < 0.0 {
        v.push(
            format!("{path}.backoff_factor"),
            "must be a finite number >= 0",
        );
    }
    if !retry.max_delay_seconds.is_finite() || retry.max_delay_seconds <= 0.0 {
        v.push(
            format!("{path}.max_delay_seconds"),
            "must be a finite number > 0",
        );
    }
    for status in &retry.retry_statuses {
        if !(100..=599).contains(status) {
            v.push(
                format!("{path}.retry_statuses"),
                format!("{status} is not an HTTP status code"),
            );
        }
    }
}

fn validate_breaker(v: &mut Validator, breaker: &BreakerSpec, path: &str) {
    if breaker.failure_threshold == 0 {
        v.push(format!("{path}.failure_threshold"), "must be at least 1");
    }
    if !breaker.reset_seconds.is_finite() || breaker.reset_seconds <= 0.0 {
        v.push(
            format!("{path}.reset_seconds"),
            "must be a finite number > 0",
        );
    }
    if !breaker.jitter.is_finite() || !(0.0..=1.0).contains(&breaker.jitter) {
        v.push(format!("{path}.jitter"), "must be within [0, 1]");
    }
}

fn validate_rate_limit(v: &mut Validator, rate_limit: &RateLimitSpec, path: &str) {
    if !HEADER_RE.is_match(&rate_limit.retry_header) {
        v.push(
            format!("{path}.retry_header"),
            "not a valid header name",
        );
    }
}

fn validate_timeout(v: &mut Validator, path: &str, timeout: f64) {
    if !timeout.is_finite() || timeout <= 0.0 {
        v.push(path, "must be a finite number > 0");
    }
}
