use log::{
    Record,
    kv::{self, VisitSource},
};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::encode::{Color, Encode, Style, Write};
use serde::Deserialize;

const DEFAULT_PATTERN: &str = "{d} {l} {t} {m}";

/// Keys that identify a call. They are written first, in this order, so log
/// lines of one action line up regardless of where the key was logged.
pub const CALL_KEYS: [&str; 4] = ["service", "alias", "method", "attempt"];

#[derive(Debug, Deserialize)]
pub struct KeyValueEncoderConfig {
    pub pattern: Option<String>,
    /// Overrides [`CALL_KEYS`].
    pub leading: Option<Vec<String>>,
}

/// Pattern-rendered record followed by its key-values as ` key=value`.
///
/// Call keys come first, everything else keeps the order it was logged in.
/// Empty values and values with whitespace are quoted.
#[derive(Debug)]
pub struct KeyValueEncoder {
    delegate: PatternEncoder,
    leading: Vec<String>,
}

impl KeyValueEncoder {
    pub fn new(pattern: &str) -> Self {
        Self::with_leading(pattern, CALL_KEYS.iter().map(|k| k.to_string()).collect())
    }

    pub fn with_leading(pattern: &str, leading: Vec<String>) -> Self {
        Self {
            delegate: PatternEncoder::new(pattern),
            leading,
        }
    }

    fn ordered(&self, mut fields: Vec<(String, String)>) -> Vec<(String, String)> {
        let mut ordered = Vec::with_capacity(fields.len());
        for key in &self.leading {
            if let Some(pos) = fields.iter().position(|(k, _)| k == key) {
                ordered.push(fields.remove(pos));
            }
        }
        ordered.extend(fields);
        ordered
    }
}

impl Encode for KeyValueEncoder {
    fn encode(&self, w: &mut dyn Write, record: &Record) -> anyhow::Result<()> {
        self.delegate.encode(w, record)?;

        let mut fields = Fields::default();
        if let Err(e) = record.key_values().visit(&mut fields) {
            write!(w, " [KV Error: {e}]")?;
        }

        for (key, value) in self.ordered(fields.0) {
            w.set_style(Style::new().text(Color::Cyan))?;
            write!(w, " {key}=")?;
            w.set_style(&Style::default())?;
            if needs_quotes(&value) {
                write!(w, "{value:?}")?;
            } else {
                w.write_all(value.as_bytes())?;
            }
        }

        w.write_all(b"\n")?;
        Ok(())
    }
}

fn needs_quotes(value: &str) -> bool {
    value.is_empty() || value.chars().any(char::is_whitespace)
}

#[derive(Default)]
struct Fields(Vec<(String, String)>);

impl<'kvs> VisitSource<'kvs> for Fields {
    fn visit_pair(&mut self, key: kv::Key<'kvs>, value: kv::Value<'kvs>) -> Result<(), kv::Error> {
        self.0.push((key.to_string(), value.to_string()));
        Ok(())
    }
}

pub struct KeyValueEncoderDeserializer;

impl log4rs::config::Deserialize for KeyValueEncoderDeserializer {
    type Trait = dyn Encode;
    type Config = KeyValueEncoderConfig;

    fn deserialize(
        &self,
        config: KeyValueEncoderConfig,
        _: &log4rs::config::Deserializers,
    ) -> anyhow::Result<Box<dyn Encode>> {
        let pattern = config.pattern.as_deref().unwrap_or(DEFAULT_PATTERN);
        Ok(Box::new(match config.leading {
            Some(leading) => KeyValueEncoder::with_leading(pattern, leading),
            None => KeyValueEncoder::new(pattern),
        }))
    }
}
