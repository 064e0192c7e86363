use crate::atn::Atn;
use crate::profiling::DecisionInfo;
use std::fmt::{Display, Formatter};
use std::io::{self, Write};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportColumn {
    Rule,
    Invocations,
    TimeMs,
    TotalK,
    MaxK,
    Ambiguities,
    DfaCacheMiss,
}

impl ReportColumn {
    pub const ALL: [ReportColumn; 7] = [
        ReportColumn::Rule,
        ReportColumn::Invocations,
        ReportColumn::TimeMs,
        ReportColumn::TotalK,
        ReportColumn::MaxK,
        ReportColumn::Ambiguities,
        ReportColumn::DfaCacheMiss,
    ];

    pub fn header(self) -> &'static str {
        match self {
            ReportColumn::Rule => "Rule",
            ReportColumn::Invocations => "Invocations",
            ReportColumn::TimeMs => "Time (ms)",
            ReportColumn::TotalK => "Total k",
            ReportColumn::MaxK => "Max k",
            ReportColumn::Ambiguities => "Ambiguities",
            ReportColumn::DfaCacheMiss => "DFA cache miss",
        }
    }

    pub fn extract(self, atn: &Atn, info: &DecisionInfo) -> String {
        match self {
            ReportColumn::Rule => format!("{}:{}", atn.rule_name_for_decision(info.decision), info.decision),
            ReportColumn::Invocations => info.invocations.to_string(),
            ReportColumn::TimeMs => (info.time_in_prediction_ns as f64 / 1_000_000.0).to_string(),
            ReportColumn::TotalK => (info.ll_total_look + info.sll_total_look).to_string(),
            ReportColumn::MaxK => info.ll_max_look.max(info.sll_max_look).to_string(),
            ReportColumn::Ambiguities => info.ambiguities.len().to_string(),
            ReportColumn::DfaCacheMiss => (info.sll_atn_transitions + info.ll_atn_transitions).to_string(),
        }
    }
}

impl Display for ReportColumn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.header())
    }
}

pub fn write_csv<W: Write>(mut out: W, atn: &Atn, decisions: &[DecisionInfo]) -> io::Result<()> {
    let header = ReportColumn::ALL.map(ReportColumn::header);
    writeln!(out, "{}", header.join(","))?;
    for info in decisions {
        let row = ReportColumn::ALL.map(|column| column.extract(atn, info));
        writeln!(out, "{}", row.join(","))?;
    }
    Ok(())
}

pub fn to_csv(atn: &Atn, decisions: &[DecisionInfo]) -> String {
    let mut out = Vec::new();
    // Writing into a Vec cannot fail.
    let _ = write_csv(&mut out, atn, decisions);
    String::from_utf8_lossy(&out).into_owned()
}
