//! Test identifier weight codec
//!
//! Instructors encode scoring data in test names: `test_<name>_<weight>` with an
//! optional trailing `_mandatory`, e.g. `test_HW.py::test_add2_2_mandatory`.
//! Only the last `::` component of a pytest node id is inspected.

use crate::constants::{MANDATORY_MARKER, NODE_ID_SEPARATOR};

/// Scoring data decoded from a test identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightSpec {
    pub base_name: String,
    pub points: u32,
    pub mandatory: bool,
}

/// Per-test decoding failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WeightError {
    #[error("{identifier}: {reason}")]
    MalformedIdentifier { identifier: String, reason: String },
}

impl WeightError {
    fn malformed(identifier: &str, reason: &str) -> Self {
        Self::MalformedIdentifier {
            identifier: identifier.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn identifier(&self) -> &str {
        match self {
            Self::MalformedIdentifier { identifier, .. } => identifier,
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            Self::MalformedIdentifier { reason, .. } => reason,
        }
    }
}

/// Decode `(base_name, points, mandatory)` from a test identifier.
///
/// The weight is the last `_`-separated segment made only of digits. A name
/// without such a segment is rejected instead of being worth zero, unless it
/// ends in `_mandatory`: those decode with `points == 0`.
pub fn decode(identifier: &str) -> Result<WeightSpec, WeightError> {
    let trimmed = identifier.trim();
    if trimmed.is_empty() {
        return Err(WeightError::malformed(identifier, "empty identifier"));
    }

    let component = trimmed
        .rsplit(NODE_ID_SEPARATOR)
        .next()
        .unwrap_or(trimmed);
    let component = strip_parametrization(component);

    let mut segments: Vec<&str> = component.split('_').collect();

    let mandatory = segments.len() > 1 && segments.last() == Some(&MANDATORY_MARKER);
    if mandatory {
        segments.pop();
    }

    let weight_index = segments
        .iter()
        .rposition(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()));

    // Mandatory tests are never weighted, so their weight is optional
    let Some(weight_index) = weight_index else {
        if !mandatory {
            return Err(WeightError::malformed(identifier, "no weight segment"));
        }
        let base_name = segments.join("_");
        if base_name.is_empty() {
            return Err(WeightError::malformed(identifier, "missing test name"));
        }
        return Ok(WeightSpec {
            base_name,
            points: 0,
            mandatory,
        });
    };

    // The grammar is `_<digits>`: a bare leading number is not a weight.
    if weight_index == 0 {
        return Err(WeightError::malformed(
            identifier,
            "weight segment must follow a name",
        ));
    }

    let points = segments[weight_index]
        .parse::<u32>()
        .map_err(|_| WeightError::malformed(identifier, "weight out of range"))?;

    Ok(WeightSpec {
        base_name: segments[..weight_index].join("_"),
        points,
        mandatory,
    })
}

/// Drop a pytest parametrization suffix such as `[case-1]`
fn strip_parametrization(component: &str) -> &str {
    match component.find('[') {
        Some(idx) if component.ends_with(']') => &component[..idx],
        _ => component,
    }
}
