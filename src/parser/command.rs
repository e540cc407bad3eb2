// SPDX-License-Identifier: Apache-2.0

//! Completed p4d command records as produced by a log parser.
//!
//! Field names on the wire follow the camelCase JSON of the p4d log
//! analysis tools, so pre-parsed records can be replayed as-is.

use serde::{Deserialize, Serialize};

/// A completed server command with its resource usage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Command {
    pub process_key: String,
    pub cmd: String,
    pub pid: i64,
    pub line_no: i64,
    pub user: String,
    pub workspace: String,
    /// Raw client address, `ip` or `proxy/ip`
    pub ip: String,
    pub app: String,
    pub args: String,
    pub start_time: String,
    pub end_time: String,
    pub compute_lapse: f64,
    pub completed_lapse: f64,
    pub running: i64,
    pub u_cpu: i64,
    pub s_cpu: i64,
    /// Blocks read, in 512-byte units
    pub disk_in: i64,
    /// Blocks written, in 512-byte units
    pub disk_out: i64,
    pub ipc_in: i64,
    pub ipc_out: i64,
    pub max_rss: i64,
    pub page_faults: i64,
    pub rpc_msgs_in: i64,
    pub rpc_msgs_out: i64,
    pub rpc_size_in: i64,
    pub rpc_size_out: i64,
    pub rpc_himark_fwd: i64,
    pub rpc_himark_rev: i64,
    pub rpc_snd: f64,
    pub rpc_rcv: f64,
    pub cmd_error: bool,
    pub tables: Vec<TableStats>,
}

/// Per-table database statistics of a command. Lock and peek times are in
/// milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TableStats {
    pub table_name: String,
    pub pages_in: i64,
    pub pages_out: i64,
    pub pages_cached: i64,
    pub pages_split_internal: i64,
    pub pages_split_leaf: i64,
    pub read_locks: i64,
    pub write_locks: i64,
    pub get_rows: i64,
    pub pos_rows: i64,
    pub scan_rows: i64,
    pub put_rows: i64,
    pub del_rows: i64,
    pub total_read_wait: i64,
    pub total_read_held: i64,
    pub total_write_wait: i64,
    pub total_write_held: i64,
    pub max_read_wait: i64,
    pub max_read_held: i64,
    pub max_write_wait: i64,
    pub max_write_held: i64,
    pub peek_count: i64,
    pub total_peek_wait: i64,
    pub total_peek_held: i64,
    pub max_peek_wait: i64,
    pub max_peek_held: i64,
}

impl TableStats {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_partial_command() {
        let cmd: Command = serde_json::from_str(
            r#"{"processKey": "4d4e5096f7b732e4a0a0e8a6f3ea4a56", "cmd": "user-sync",
                "pid": 2345, "lineNo": 10, "uCpu": 7, "diskIn": 2, "cmdError": true,
                "tables": [{"tableName": "db.have", "readLocks": 12, "getRows": 3}]}"#,
        )
        .unwrap();

        assert_eq!(cmd.cmd, "user-sync");
        assert_eq!(cmd.pid, 2345);
        assert_eq!(cmd.u_cpu, 7);
        assert_eq!(cmd.disk_in, 2);
        assert!(cmd.cmd_error);
        assert_eq!(cmd.user, "");
        assert_eq!(cmd.tables.len(), 1);
        assert_eq!(cmd.tables[0].table_name, "db.have");
        assert_eq!(cmd.tables[0].read_locks, 12);
        assert_eq!(cmd.tables[0].pages_in, 0);
    }
}
