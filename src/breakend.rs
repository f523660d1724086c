use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies which end of an SV a breakend belongs to
///
/// Single breakend SVs only have a `Start` breakend.
///
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
    strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BreakendSide {
    Start,
    End,
}

impl BreakendSide {
    pub fn other(self) -> Self {
        match self {
            BreakendSide::Start => BreakendSide::End,
            BreakendSide::End => BreakendSide::Start,
        }
    }
}

/// Direction of the genome joined by a breakend
///
/// `Forward` ('+') means the breakend is anchored on its left side, so the rearrangement
/// continues from the next higher position.
///
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Orientation {
    #[serde(rename = "+")]
    Forward,
    #[serde(rename = "-")]
    Reverse,
}

/// Stable identifier for a breakend within one cluster
///
#[derive(Clone, Copy, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct BreakendId {
    pub sv_index: usize,
    pub side: BreakendSide,
}

impl BreakendId {
    pub fn new(sv_index: usize, side: BreakendSide) -> Self {
        Self { sv_index, side }
    }

    pub fn start(sv_index: usize) -> Self {
        Self::new(sv_index, BreakendSide::Start)
    }

    pub fn end(sv_index: usize) -> Self {
        Self::new(sv_index, BreakendSide::End)
    }
}

impl fmt::Debug for BreakendId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let side: &'static str = self.side.into();
        write!(f, "sv{}:{}", self.sv_index, side)
    }
}

/// A single end of an SV
///
#[derive(Clone, Debug)]
pub struct Breakend {
    pub chrom: String,
    pub pos: i64,
}

/// Distance assigned to breakend pairs on different chromosomes
pub const INTER_CHROM_DISTANCE: u64 = u64::MAX;

/// Get the number of bases separating two breakends
///
/// Breakends on different chromosomes are given the maximum distance, so that they always sort
/// after any intra-chromosomal pair.
///
pub fn get_breakend_distance(be1: &Breakend, be2: &Breakend) -> u64 {
    if be1.chrom != be2.chrom {
        INTER_CHROM_DISTANCE
    } else {
        be1.pos.abs_diff(be2.pos)
    }
}

/// Input description of one breakend, including its ploidy estimate
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct BreakendDefinition {
    pub chrom: String,
    pub pos: i64,
    pub orientation: Orientation,
    pub ploidy: f64,

    #[serde(default)]
    pub uncertainty: f64,
}

/// Input description of one SV
///
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SvDefinition {
    #[serde(rename = "id")]
    pub label: String,

    /// One breakend for single-breakend SVs, otherwise two
    pub breakends: Vec<BreakendDefinition>,

    /// Set if this SV is a duplication forming part of a double minute
    ///
    /// These SVs may eventually link to themselves, so their connectivity is not restricted by
    /// the single-option rule.
    ///
    #[serde(default)]
    pub double_minute_dup: bool,
}

pub struct StructuralVariant {
    pub label: String,
    pub breakends: Vec<Breakend>,
    pub is_double_minute_dup: bool,
}

impl StructuralVariant {
    pub fn from_definition(def: &SvDefinition) -> Self {
        let breakends = def
            .breakends
            .iter()
            .map(|x| Breakend {
                chrom: x.chrom.clone(),
                pos: x.pos,
            })
            .collect();
        Self {
            label: def.label.clone(),
            breakends,
            is_double_minute_dup: def.double_minute_dup,
        }
    }

    pub fn is_single_breakend(&self) -> bool {
        self.breakends.len() == 1
    }

    pub fn breakend(&self, side: BreakendSide) -> Option<&Breakend> {
        self.breakends.get(side as usize)
    }

    pub fn breakend_label(&self, side: BreakendSide) -> String {
        let side: &'static str = side.into();
        format!("{}:{}", self.label, side)
    }
}

/// Find the breakend at the opposite end of the SV from `breakend`
///
/// Returns None for single breakend SVs.
///
pub fn get_other_breakend(svs: &[StructuralVariant], breakend: BreakendId) -> Option<BreakendId> {
    let sv = &svs[breakend.sv_index];
    let other = BreakendId::new(breakend.sv_index, breakend.side.other());
    sv.breakend(other.side).map(|_| other)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn get_test_sv(index: usize, breakend_count: usize) -> StructuralVariant {
        let def = SvDefinition {
            label: format!("sv{index}"),
            breakends: (0..breakend_count)
                .map(|i| BreakendDefinition {
                    chrom: "chr1".to_string(),
                    pos: 1000 * (i as i64 + 1),
                    orientation: Orientation::Forward,
                    ploidy: 2.0,
                    uncertainty: 0.0,
                })
                .collect(),
            double_minute_dup: false,
        };
        StructuralVariant::from_definition(&def)
    }

    #[test]
    fn test_get_other_breakend() {
        let svs = vec![get_test_sv(0, 2), get_test_sv(1, 1)];
        assert_eq!(
            get_other_breakend(&svs, BreakendId::start(0)),
            Some(BreakendId::end(0))
        );
        assert_eq!(
            get_other_breakend(&svs, BreakendId::end(0)),
            Some(BreakendId::start(0))
        );
        assert_eq!(get_other_breakend(&svs, BreakendId::start(1)), None);
    }

    #[test]
    fn test_get_breakend_distance() {
        let sv = get_test_sv(0, 2);
        assert_eq!(get_breakend_distance(&sv.breakends[0], &sv.breakends[1]), 1000);

        let mut other = sv.breakends[1].clone();
        other.chrom = "chr2".to_string();
        assert_eq!(
            get_breakend_distance(&sv.breakends[0], &other),
            INTER_CHROM_DISTANCE
        );
    }

    #[test]
    fn test_breakend_side_label() {
        let sv = get_test_sv(3, 2);
        assert_eq!(sv.breakend_label(BreakendSide::End), "sv3:end");
        assert_eq!(format!("{:?}", BreakendId::start(3)), "sv3:start");
    }
}
