use chrono::Utc;
use std::collections::BTreeMap;

use crate::devices::ParameterRecord;
use crate::services::PollReport;
use crate::utils::error::PollError;

pub trait RecordFormatter: Send + Sync {
    fn format_header(&self) -> String;
    fn format_record(&self, record: &ParameterRecord) -> Result<String, PollError>;

    fn format(&self, report: &PollReport) -> Result<String, PollError> {
        let mut output = self.format_header();
        for record in &report.records {
            output.push_str(&self.format_record(record)?);
        }
        Ok(output)
    }
}

pub struct ConsoleFormatter;

impl RecordFormatter for ConsoleFormatter {
    fn format_header(&self) -> String {
        format!(
            "🚀 Drive Parameters - {}\n{}\n",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
            "═".repeat(60)
        )
    }

    fn format_record(&self, record: &ParameterRecord) -> Result<String, PollError> {
        Ok(format!(
            "#{:<3} [{:>4}] {:<20} {:>10} {}\n",
            record.iteration,
            record.channel_id,
            record.channel_name,
            record.scaled_payload,
            record.unit
        ))
    }
}

/// Rows of `iteration,channel_id,channel_name,payload,unit`, in collection order.
pub struct CsvFormatter;

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

impl RecordFormatter for CsvFormatter {
    fn format_header(&self) -> String {
        "iteration,channel_id,channel_name,payload,unit\n".to_string()
    }

    fn format_record(&self, record: &ParameterRecord) -> Result<String, PollError> {
        Ok(format!(
            "{},{},{},{},{}\n",
            record.iteration,
            record.channel_id,
            csv_field(&record.channel_name),
            record.scaled_payload,
            csv_field(&record.unit)
        ))
    }
}

pub struct JsonFormatter;

impl RecordFormatter for JsonFormatter {
    fn format_header(&self) -> String {
        String::new() // JSON doesn't need headers
    }

    fn format_record(&self, record: &ParameterRecord) -> Result<String, PollError> {
        Ok(serde_json::to_string(record)?)
    }

    fn format(&self, report: &PollReport) -> Result<String, PollError> {
        let result = serde_json::json!({
            "run_id": report.run_id.to_string(),
            "timestamp": Utc::now().to_rfc3339(),
            "stats": report.stats,
            "records": report.records,
        });

        Ok(serde_json::to_string_pretty(&result)?)
    }
}

/// One `<prefix>;v1;v2;...` line per iteration, values in channel-table order.
/// A channel with no record in that iteration leaves an empty field.
pub struct LineFormatter {
    prefix: String,
    channel_ids: Vec<u16>,
}

impl LineFormatter {
    pub fn new(prefix: &str, channel_ids: Vec<u16>) -> Self {
        Self {
            prefix: prefix.to_string(),
            channel_ids,
        }
    }

    pub fn format_iteration(&self, records: &[&ParameterRecord]) -> String {
        let mut fields = vec![self.prefix.clone()];
        for id in &self.channel_ids {
            let value = records
                .iter()
                .find(|r| r.channel_id == *id)
                .map(|r| r.scaled_payload.to_string())
                .unwrap_or_default();
            fields.push(value);
        }
        fields.join(";")
    }
}

impl RecordFormatter for LineFormatter {
    fn format_header(&self) -> String {
        String::new()
    }

    fn format_record(&self, record: &ParameterRecord) -> Result<String, PollError> {
        Ok(format!("{};{}\n", self.prefix, record.scaled_payload))
    }

    fn format(&self, report: &PollReport) -> Result<String, PollError> {
        let mut by_iteration: BTreeMap<u32, Vec<&ParameterRecord>> = BTreeMap::new();
        for record in &report.records {
            by_iteration.entry(record.iteration).or_default().push(record);
        }

        let mut output = String::new();
        for records in by_iteration.values() {
            output.push_str(&self.format_iteration(records));
            output.push('\n');
        }
        Ok(output)
    }
}
