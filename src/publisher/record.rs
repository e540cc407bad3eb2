// SPDX-License-Identifier: Apache-2.0

//! Mapping of parser output to published field names and units.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value};

use super::PublishError;
use crate::parser::{Command, TableStats};

/// Size of a disk block as counted by p4d
const DISK_BLOCK_SIZE: i64 = 512;

/// A flat record ready for delivery
#[derive(Debug, Clone, PartialEq)]
pub struct PublishRecord {
    pub timestamp: DateTime<Utc>,
    pub fields: Map<String, Value>,
}

impl PublishRecord {
    /// Empty record stamped with the current time and tagged with `type`
    pub fn new(name: &str) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Value::from(name));
        Self {
            timestamp: Utc::now(),
            fields,
        }
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// JSON object with `@timestamp` plus all fields
    pub fn to_json(&self) -> Value {
        let mut object = self.fields.clone();
        object.insert(
            "@timestamp".to_string(),
            Value::from(self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        Value::Object(object)
    }

    fn set_if_positive(&mut self, key: &str, value: i64) {
        if value > 0 {
            self.insert(format!("p4.{}", key), value);
        }
    }

    fn set_if_positive_sec(&mut self, key: &str, value: f64) {
        if value > 0.0 {
            self.insert(format!("p4.{}", key), value);
        }
    }

    fn set_table_if_positive(&mut self, table: &str, key: &str, value: i64) {
        if value > 0 {
            self.insert(format!("p4.tbl.{}.{}", table, key), value);
        }
    }

    /// Milliseconds in, seconds out
    fn set_table_if_positive_ms(&mut self, table: &str, key: &str, value_ms: i64) {
        if value_ms > 0 {
            self.insert(
                format!("p4.tbl.{}.{}", table, key),
                value_ms as f64 / 1000.0,
            );
        }
    }
}

/// Build the record for a completed command.
pub fn command_record(name: &str, command: &Command) -> PublishRecord {
    let mut record = PublishRecord::new(name);

    record.insert("p4.process_key", command.process_key.as_str());
    record.insert("p4.cmd", command.cmd.as_str());
    record.insert("p4.pid", command.pid);
    record.insert("p4.line_no", command.line_no);
    record.insert("p4.user", command.user.as_str());
    record.insert("p4.workspace", command.workspace.as_str());
    record.insert("p4.start_time", command.start_time.as_str());
    record.insert("p4.end_time", command.end_time.as_str());
    record.insert("p4.compute_sec", command.compute_lapse);
    record.insert("p4.completed_sec", command.completed_lapse);
    record.insert("p4.app", command.app.as_str());
    record.insert("p4.args", command.args.as_str());
    record.insert("p4.running", command.running);
    record.insert("p4.cpu.user", command.u_cpu);
    record.insert("p4.cpu.system", command.s_cpu);
    record.set_if_positive("disk.read_bytes", command.disk_in.saturating_mul(DISK_BLOCK_SIZE));
    record.set_if_positive("disk.write_bytes", command.disk_out.saturating_mul(DISK_BLOCK_SIZE));
    record.insert("p4.max_rss", command.max_rss);
    record.insert("p4.page_faults", command.page_faults);
    record.insert("p4.cmd_error", command.cmd_error);

    record.set_if_positive("ipc.in", command.ipc_in);
    record.set_if_positive("ipc.out", command.ipc_out);
    record.set_if_positive("rpc.msgs.in", command.rpc_msgs_in);
    record.set_if_positive("rpc.msgs.out", command.rpc_msgs_out);
    record.set_if_positive("rpc.size.in", command.rpc_size_in);
    record.set_if_positive("rpc.size.out", command.rpc_size_out);
    record.set_if_positive("rpc.himark.fwd", command.rpc_himark_fwd);
    record.set_if_positive("rpc.himark.rev", command.rpc_himark_rev);
    record.set_if_positive_sec("rpc.snd_sec", command.rpc_snd);
    record.set_if_positive_sec("rpc.rcv_sec", command.rpc_rcv);

    set_client_ip(&mut record, &command.ip);

    for table in &command.tables {
        set_table_fields(&mut record, table);
    }

    record
}

/// `ip`, or `proxy/ip` when the command came through a proxy.
/// Background tasks report the literal `background`.
fn set_client_ip(record: &mut PublishRecord, ip: &str) {
    let parts: Vec<&str> = ip.split('/').collect();
    match parts.as_slice() {
        [single] => {
            if !single.is_empty() && *single != "background" {
                record.insert("p4.ip", *single);
            }
        }
        [proxy, client, ..] => {
            if !proxy.is_empty() {
                record.insert("p4.proxy_ip", *proxy);
            }
            if !client.is_empty() {
                record.insert("p4.ip", *client);
            }
        }
        [] => {}
    }
}

fn set_table_fields(record: &mut PublishRecord, table: &TableStats) {
    let name = table.table_name.to_lowercase();
    let name = name.as_str();

    record.set_table_if_positive(name, "pages.in", table.pages_in);
    record.set_table_if_positive(name, "pages.out", table.pages_out);
    record.set_table_if_positive(name, "pages.cached", table.pages_cached);
    record.set_table_if_positive(name, "pages.split_internal", table.pages_split_internal);
    record.set_table_if_positive(name, "pages.split_leaf", table.pages_split_leaf);
    record.set_table_if_positive_ms(name, "locks.read.total_sec", table.read_locks);
    record.set_table_if_positive_ms(name, "locks.read.wait.total_sec", table.total_read_wait);
    record.set_table_if_positive_ms(name, "locks.read.wait.max_sec", table.max_read_wait);
    record.set_table_if_positive_ms(name, "locks.read.held.total_sec", table.total_read_held);
    record.set_table_if_positive_ms(name, "locks.read.held.max_sec", table.max_read_held);
    record.set_table_if_positive_ms(name, "locks.write.total_sec", table.write_locks);
    record.set_table_if_positive_ms(name, "locks.write.wait.total_sec", table.total_write_wait);
    record.set_table_if_positive_ms(name, "locks.write.wait.max_sec", table.max_write_wait);
    record.set_table_if_positive_ms(name, "locks.write.held.total_sec", table.total_write_held);
    record.set_table_if_positive_ms(name, "locks.write.held.max_sec", table.max_write_held);
    record.set_table_if_positive(name, "rows.get", table.get_rows);
    record.set_table_if_positive(name, "rows.pos", table.pos_rows);
    record.set_table_if_positive(name, "rows.scan", table.scan_rows);
    record.set_table_if_positive(name, "rows.put", table.put_rows);
    record.set_table_if_positive(name, "rows.del", table.del_rows);
    record.set_table_if_positive(name, "peek.count", table.peek_count);
    record.set_table_if_positive_ms(name, "peek.wait.total_sec", table.total_peek_wait);
    record.set_table_if_positive_ms(name, "peek.wait.max_sec", table.max_peek_wait);
    record.set_table_if_positive_ms(name, "peek.held.total_sec", table.total_peek_held);
    record.set_table_if_positive_ms(name, "peek.held.max_sec", table.max_peek_held);
}

/// Payload keys copied into event records
const EVENT_FIELDS: [(&str, &str); 9] = [
    ("cmd", "p4.cmd"),
    ("user", "p4.user"),
    ("workspace", "p4.workspace"),
    ("ip", "p4.ip"),
    ("args", "p4.args"),
    ("startTime", "p4.start_time"),
    ("endTime", "p4.end_time"),
    ("computeLapse", "p4.compute_sec"),
    ("completedLapse", "p4.completed_sec"),
];

/// Decode an event payload and build its record. Missing keys are left out.
pub fn event_record(name: &str, payload: &str) -> Result<PublishRecord, PublishError> {
    let object = match serde_json::from_str::<Value>(payload)? {
        Value::Object(object) => object,
        other => {
            return Err(PublishError::InvalidRecord(format!(
                "event payload is not an object: {}",
                other
            )));
        }
    };

    let mut record = PublishRecord::new(name);
    for (source, target) in EVENT_FIELDS {
        if let Some(value) = object.get(source) {
            record.insert(target, value.clone());
        }
    }
    Ok(record)
}
