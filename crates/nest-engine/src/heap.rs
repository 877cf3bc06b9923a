//! Heap statistics and job-drain reports.

use serde::{Deserialize, Serialize};

/// Snapshot of a QuickJS runtime's memory usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapInfo {
    /// Bytes currently allocated through the runtime allocator
    pub malloc_size: i64,
    /// Allocation ceiling (-1 when unlimited)
    pub malloc_limit: i64,
    /// Bytes in use by live engine data
    pub memory_used_size: i64,
    /// Number of live allocations
    pub malloc_count: i64,
    /// Live objects
    pub object_count: i64,
    /// Live bytecode functions
    pub function_count: i64,
    /// Live native functions
    pub native_function_count: i64,
    /// Live arrays
    pub array_count: i64,
    /// Interned atoms
    pub atom_count: i64,
    /// Live strings
    pub string_count: i64,
}

impl From<&rquickjs::qjs::JSMemoryUsage> for HeapInfo {
    fn from(usage: &rquickjs::qjs::JSMemoryUsage) -> Self {
        Self {
            malloc_size: usage.malloc_size,
            malloc_limit: usage.malloc_limit,
            memory_used_size: usage.memory_used_size,
            malloc_count: usage.malloc_count,
            object_count: usage.obj_count,
            function_count: usage.js_func_count,
            native_function_count: usage.c_func_count,
            array_count: usage.array_count,
            atom_count: usage.atom_count,
            string_count: usage.str_count,
        }
    }
}

/// Outcome of one pending-job drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    /// Jobs that ran to completion
    pub executed: usize,
    /// Jobs that threw; their exceptions were discarded
    pub failed: usize,
    /// True when the iteration cap stopped the drain with jobs still queued
    pub exhausted: bool,
}

impl DrainReport {
    /// Total number of jobs taken off the queue.
    pub fn total(&self) -> usize {
        self.executed + self.failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_report_total() {
        let report = DrainReport {
            executed: 3,
            failed: 2,
            exhausted: false,
        };
        assert_eq!(report.total(), 5);
    }

    #[test]
    fn test_heap_info_serializes_field_names() {
        let info = HeapInfo {
            object_count: 7,
            ..Default::default()
        };
        let json = serde_json::to_value(info).unwrap();
        assert_eq!(json["object_count"], 7);
        assert_eq!(json["malloc_limit"], 0);
    }
}
