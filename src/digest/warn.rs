use crate::error::DigestError;

#[derive(Debug, Clone, Copy)]
pub struct WarnEvent<'a> {
    pub code: &'a str,
    pub stage: &'a str,
    pub action: &'a str,
    pub process: &'a str,
    pub target: &'a str,
    pub reason: &'a str,
    pub err: &'a str,
}

fn sanitize_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_sep = false;
    for ch in value.chars() {
        if ch.is_whitespace() {
            if !out.is_empty() && !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else if !ch.is_control() {
            out.push(ch);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        "na".to_string()
    } else {
        trimmed.to_string()
    }
}

pub fn emit(event: WarnEvent<'_>) {
    tracing::warn!(
        code = %sanitize_value(event.code),
        stage = %sanitize_value(event.stage),
        action = %sanitize_value(event.action),
        process = %sanitize_value(event.process),
        target = %sanitize_value(event.target),
        reason = %sanitize_value(event.reason),
        err = %sanitize_value(event.err),
        "EXDIGEST_WARN"
    );
}

/// Where a non-fatal error happened and what the run did about it.
#[derive(Debug, Clone, Copy)]
pub struct ErrorContext<'a> {
    pub stage: &'a str,
    pub action: &'a str,
    pub process: &'a str,
    pub target: &'a str,
    pub reason: &'a str,
}

fn error_event<'a>(err: &DigestError, text: &'a str, ctx: ErrorContext<'a>) -> WarnEvent<'a> {
    WarnEvent {
        code: err.code(),
        stage: ctx.stage,
        action: ctx.action,
        process: ctx.process,
        target: ctx.target,
        reason: ctx.reason,
        err: text,
    }
}

/// Report a non-fatal [`DigestError`] and keep going.
pub fn emit_error(err: &DigestError, ctx: ErrorContext<'_>) {
    let text = err.to_string();
    emit(error_event(err, &text, ctx));
}
