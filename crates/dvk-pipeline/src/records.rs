// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Run-record / detection-record / decode-metadata wire shapes (§6). These
//! are plain `serde`-derived structs; writing them to disk under a
//! caller-chosen path is a `dvk-tools` concern.

use dvk_core::detector::{Method, ScoredCandidate};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectedProtocol {
    pub protocol_id: String,
    pub protocol_version: String,
    pub confidence: f64,
    pub rule_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Detection {
    pub method: String,
    pub detected: DetectedProtocol,
    pub evidence: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidates: Option<Vec<CandidateRecord>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambiguous: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub protocol_id: String,
    pub protocol_version: String,
    pub score: i64,
    pub confidence: f64,
}

impl From<&ScoredCandidate> for CandidateRecord {
    fn from(c: &ScoredCandidate) -> Self {
        CandidateRecord { protocol_id: c.protocol_id.clone(), protocol_version: c.protocol_version.clone(), score: c.score, confidence: c.confidence }
    }
}

fn method_tag(method: Method) -> &'static str {
    match method {
        Method::Query => "query",
        Method::Banner => "banner",
        Method::Sniff => "sniff",
    }
}

/// Per-device detection entry written by `dvk-detect` (§6 "Run records").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub device_serial: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub transport: String,
    pub detection: Detection,
}

impl RunRecord {
    pub fn from_detection(device_serial: String, transport: String, evidence: String, result: &dvk_core::detector::DetectionResult) -> Self {
        RunRecord {
            device_serial,
            model_id: result.model_id.clone(),
            transport,
            detection: Detection {
                method: method_tag(result.method).to_string(),
                detected: DetectedProtocol {
                    protocol_id: result.protocol_id.clone(),
                    protocol_version: result.protocol_version.clone(),
                    confidence: result.confidence,
                    rule_id: result.rule_id.clone(),
                },
                evidence,
                candidates: result.candidates.as_ref().map(|cs| cs.iter().map(CandidateRecord::from).collect()),
                ambiguous: if result.ambiguous { Some(true) } else { None },
            },
        }
    }
}

/// Summary of an offline decode run (§6 "Outputs (offline)").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecodeMetadata {
    pub device_id: String,
    pub protocol: String,
    pub frame_name: String,
    pub input_path: String,
    pub output_paths: Vec<String>,
    pub stats: DecodeStatsRecord,
    pub semantic: SemanticApplication,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default)]
pub struct DecodeStatsRecord {
    pub total_bytes: u64,
    pub frames_ok: u64,
    pub frames_bad_checksum: u64,
    pub resyncs: u64,
    pub decode_errors: u64,
}

impl From<dvk_core::framer::FramerStats> for DecodeStatsRecord {
    fn from(s: dvk_core::framer::FramerStats) -> Self {
        DecodeStatsRecord { total_bytes: s.total_bytes, frames_ok: s.frames_ok, frames_bad_checksum: s.frames_bad_checksum, resyncs: s.resyncs, decode_errors: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticApplication {
    pub applied: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_record_round_trips_through_json() {
        let result = dvk_core::detector::DetectionResult {
            protocol_id: "lidar_x".to_string(),
            protocol_version: "1".to_string(),
            confidence: 0.95,
            rule_id: Some("banner1".to_string()),
            method: Method::Banner,
            model_id: Some("m1".to_string()),
            candidates: None,
            ambiguous: false,
        };
        let record = RunRecord::from_detection("SN123".to_string(), "uart".to_string(), "BOOT VER=1.0".to_string(), &result);
        let json = serde_json::to_string(&record).unwrap();
        let back: RunRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.detection.detected.protocol_id, "lidar_x");
        assert_eq!(back.detection.method, "banner");
    }
}
