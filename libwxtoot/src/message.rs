//! Message sourcing
//!
//! A status text either comes from rendering a template against the record
//! or, with the `template` choice, verbatim from a prepared file (a report
//! generator writes it ahead of time). A second file can stand in for one
//! hour a day to carry a daily summary.

use std::path::{Path, PathBuf};

use tracing::{debug, error, info};

use crate::format::{FormatEngine, Template};
use crate::types::{FormatChoice, Record};

pub const SIMPLE_TEMPLATE: &str = "{station:%.8s}: Ws: {windSpeed:%.1f}; Wd: {windDir:%03.0f}; \
Wg: {windGust:%.1f}; oT: {outTemp:%.1f}; oH: {outHumidity:%.2f}; \
P: {barometer:%.3f}; R: {rain:%.3f}";

pub const FULL_TEMPLATE: &str = "{station:%s}\n Windspeed: {windSpeed:%.1f}\n Winddir: {windDir:%03.0f}\n Windgust: {windGust:%.1f}\n outTemp: {outTemp:%.1f}\n outHumidity: {outHumidity:%.2f}\n Pressure: {barometer:%.3f}\n Rain: {rain:%.3f}\n Date Time: {dateTime:%d %b %Y %H:%M}";

pub const SHORT_TEMPLATE: &str = "{station:%.8s}: Ws: {windSpeed:%.1f}; Wd: {windDir:%03.0f}";

pub const MISSING_TEMPLATE_FILE: &str = "Missing template file";
pub const MISSING_SUMMARY_FILE: &str = "Missing summary template file";

/// Built-in template for a format choice
pub fn builtin_template(choice: &FormatChoice) -> &'static str {
    match choice {
        FormatChoice::Simple => SIMPLE_TEMPLATE,
        FormatChoice::Full => FULL_TEMPLATE,
        FormatChoice::Template | FormatChoice::Short => SHORT_TEMPLATE,
    }
}

/// Where message text for a record comes from
#[derive(Debug, Clone)]
pub enum MessageSource {
    Render(Template),
    File {
        template_file: PathBuf,
        summary_file: Option<PathBuf>,
        summary_hour: u32,
    },
}

/// Produces the status text for each record
#[derive(Debug, Clone)]
pub struct MessageBuilder {
    source: MessageSource,
    engine: FormatEngine,
}

impl MessageBuilder {
    pub fn new(source: MessageSource, engine: FormatEngine) -> Self {
        if let MessageSource::Render(template) = &source {
            debug!(
                "message template has {} placeholder(s)",
                template.placeholders().count()
            );
        }
        Self { source, engine }
    }

    /// Render `template` for every record
    pub fn from_template(template: &str, engine: FormatEngine) -> Self {
        Self::new(MessageSource::Render(Template::parse(template)), engine)
    }

    pub fn engine(&self) -> &FormatEngine {
        &self.engine
    }

    /// Message for `record`; `local_hour` selects the summary file.
    pub fn build(&self, record: &Record, local_hour: u32) -> String {
        match &self.source {
            MessageSource::Render(template) => self.engine.render_template(template, record),
            MessageSource::File {
                template_file,
                summary_file,
                summary_hour,
            } => match summary_file {
                Some(summary) if local_hour == *summary_hour => {
                    read_prepared(summary).unwrap_or_else(|e| {
                        info!("Skipping summary file, not found!");
                        debug!("MISSING {} continuing... {}", summary.display(), e);
                        MISSING_SUMMARY_FILE.to_string()
                    })
                }
                _ => read_prepared(template_file).unwrap_or_else(|e| {
                    error!("MISSING {} continuing... {}", template_file.display(), e);
                    MISSING_TEMPLATE_FILE.to_string()
                }),
            },
        }
    }
}

/// Read a prepared message; literal `\n` sequences become newlines.
fn read_prepared(path: &Path) -> std::io::Result<String> {
    let text = std::fs::read_to_string(path)?;
    Ok(text.replace("\\n", "\n"))
}
