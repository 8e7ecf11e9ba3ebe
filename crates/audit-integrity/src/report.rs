use uuid::Uuid;

/// Result of `verify_chain`, per spec §4.5: an integrity score plus the
/// specific sequences that failed hash or linkage verification.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainReport {
    /// Inclusive sequence range covered.
    pub range: (u64, u64),
    /// Number of sequences that verified successfully.
    pub verified_count: u64,
    /// Total number of sequences examined (may be less than `range`'s
    /// width if sequences were missing, which `verify_sequence` flags).
    pub total_count: u64,
    /// Sequences whose hash or `previous_hash` linkage failed.
    pub failed_sequences: Vec<u64>,
    /// `verified_count / total_count`, or `1.0` for an empty range.
    pub integrity_score: f64,
    /// Whether every examined sequence verified and `total_count` covers
    /// the full requested range.
    pub is_valid: bool,
    /// Set when the check was cancelled partway through; a cancelled
    /// check never raises an alert (spec §5).
    pub incomplete: bool,
}

impl ChainReport {
    pub(crate) fn compute(range: (u64, u64), total: u64, failed: Vec<u64>, incomplete: bool) -> Self {
        let verified = total.saturating_sub(failed.len() as u64);
        let score = if total == 0 { 1.0 } else { verified as f64 / total as f64 };
        let expected_width = range.1.saturating_sub(range.0) + 1;
        Self {
            range,
            verified_count: verified,
            total_count: total,
            is_valid: failed.is_empty() && total == expected_width && !incomplete,
            failed_sequences: failed,
            integrity_score: score,
            incomplete,
        }
    }
}

/// Result of `verify_sequence`: gaps, duplicates, and out-of-order
/// timestamps within a requested range.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequenceReport {
    /// Inclusive sequence range covered.
    pub range: (u64, u64),
    /// Sequence numbers expected but not present in the store.
    pub gaps: Vec<u64>,
    /// Sequence numbers that appeared more than once with differing hashes.
    pub duplicates: Vec<u64>,
    /// Sequence numbers whose timestamp is earlier than their predecessor's.
    pub out_of_order: Vec<u64>,
    /// Whether the requested range was fully examined.
    pub incomplete: bool,
}

impl SequenceReport {
    /// No gaps, duplicates, or reordering found, and the scan completed.
    pub fn is_valid(&self) -> bool {
        self.gaps.is_empty() && self.duplicates.is_empty() && self.out_of_order.is_empty() && !self.incomplete
    }

    /// Number of gap sequences found.
    pub fn gaps_found(&self) -> usize {
        self.gaps.len()
    }

    /// Number of duplicate sequences found.
    pub fn duplicates_found(&self) -> usize {
        self.duplicates.len()
    }
}

/// Corruption level used to select an alert severity, per spec §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CorruptionLevel {
    /// Corruption ratio at or below a low threshold.
    Low,
    /// Corruption ratio in the medium band.
    Medium,
    /// Corruption ratio above the configured `corruption_threshold`.
    High,
    /// Every examined event failed; total loss of confidence in the range.
    Severe,
}

impl CorruptionLevel {
    /// The string spelling used by `corruption_level_to_alert_severity`.
    pub fn as_str(&self) -> &'static str {
        match self {
            CorruptionLevel::Low => "low",
            CorruptionLevel::Medium => "medium",
            CorruptionLevel::High => "high",
            CorruptionLevel::Severe => "severe",
        }
    }
}

/// Result of `detect_corruption`: hash recomputation, schema validity, and
/// reference-integrity checks combined.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptionReport {
    /// Inclusive sequence range covered.
    pub range: (u64, u64),
    /// Sequences that failed any of the corruption checks.
    pub corrupted_sequences: Vec<u64>,
    /// Total sequences examined.
    pub total_count: u64,
    /// `corrupted_sequences.len() / total_count`.
    pub corruption_ratio: f64,
    /// Severity band derived from `corruption_ratio`.
    pub level: CorruptionLevel,
    /// Whether the scan was a deep (every event) or sampled scan.
    pub sampled: bool,
    /// Whether the requested range was fully examined.
    pub incomplete: bool,
}

impl CorruptionReport {
    /// No corrupted sequences found and the scan completed.
    pub fn is_valid(&self) -> bool {
        self.corrupted_sequences.is_empty() && !self.incomplete
    }
}

/// Result of `repair_chain`. Per spec §4.5/§9, repair never rewrites
/// history directly: it documents findings in a single repair-audit event
/// appended through the normal ingestion pipeline, then invalidates any
/// cached chain state overlapping the range.
#[derive(Debug, Clone, PartialEq)]
pub struct RepairOutcome {
    /// Inclusive sequence range that was examined for repair.
    pub range: (u64, u64),
    /// Sequences found corrupted by the pre-repair `verify_chain` pass.
    pub corrupted_sequences: Vec<u64>,
    /// Id of the repair-audit event documenting this repair, if one was
    /// successfully enqueued.
    pub repair_event_id: Option<Uuid>,
}
