fn sanitize_value(value: &str) -> String {
    let joined = value
        .split_ascii_whitespace()
        .map(|word| word.chars().filter(char::is_ascii_graphic).collect::<String>())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    if joined.is_empty() { "na".to_string() } else { joined }
}

#[derive(Debug, Clone, Default)]
pub struct WarnEvent {
    code: String,
    stage: String,
    action: String,
    session: String,
    source: String,
    reason: String,
    err: String,
}

impl WarnEvent {
    pub fn new(code: &str, stage: &str, action: &str) -> Self {
        Self {
            code: code.to_string(),
            stage: stage.to_string(),
            action: action.to_string(),
            ..Self::default()
        }
    }

    pub fn session(mut self, session: &str) -> Self {
        self.session = session.to_string();
        self
    }

    pub fn source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn reason(mut self, reason: &str) -> Self {
        self.reason = reason.to_string();
        self
    }

    pub fn err(mut self, err: &str) -> Self {
        self.err = err.to_string();
        self
    }

    fn render(&self) -> String {
        format!(
            "TRAIL_WARN code={} stage={} action={} session={} source={} reason={} err={}",
            sanitize_value(&self.code),
            sanitize_value(&self.stage),
            sanitize_value(&self.action),
            sanitize_value(&self.session),
            sanitize_value(&self.source),
            sanitize_value(&self.reason),
            sanitize_value(&self.err),
        )
    }
}

pub fn emit(event: WarnEvent) {
    tracing::warn!("{}", event.render());
}
