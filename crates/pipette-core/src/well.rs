//! Well label <-> linear index conversion on the 8 x 12 grid.
//!
//! Indices run down each column first: A1 = 1, B1 = 2, ... H1 = 8, A2 = 9,
//! ... H12 = 96. Tip racks use the same numbering.

use crate::error::{PipetteError, Result};

pub const ROWS: &str = "ABCDEFGH";
pub const ROW_COUNT: u32 = 8;
pub const COLUMN_COUNT: u32 = 12;
pub const WELL_COUNT: u32 = ROW_COUNT * COLUMN_COUNT;

fn split_label(label: &str) -> Result<(u32, u32)> {
    let invalid = || PipetteError::InvalidWellLabel(label.to_string());
    let trimmed = label.trim();
    let mut chars = trimmed.chars();
    let letter = chars.next().ok_or_else(invalid)?.to_ascii_uppercase();
    let row = ROWS.find(letter).ok_or_else(invalid)? as u32;
    let column: u32 = chars.as_str().parse().map_err(|_| invalid())?;
    if column == 0 || column > COLUMN_COUNT {
        return Err(invalid());
    }
    Ok((row, column))
}

/// Canonical form of a label: upper-case row, unpadded column (`a01` -> `A1`).
pub fn normalize(label: &str) -> Result<String> {
    let (row, column) = split_label(label)?;
    Ok(format!("{}{}", &ROWS[row as usize..=row as usize], column))
}

pub fn to_index(label: &str) -> Result<u32> {
    let (row, column) = split_label(label)?;
    Ok((column - 1) * ROW_COUNT + row + 1)
}

pub fn to_label(index: u32) -> Result<String> {
    if index == 0 || index > WELL_COUNT {
        return Err(PipetteError::InvalidTipIndex(index));
    }
    let column = (index - 1) / ROW_COUNT + 1;
    let row = ((index - 1) % ROW_COUNT) as usize;
    Ok(format!("{}{}", &ROWS[row..=row], column))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners() {
        assert_eq!(to_index("A1").unwrap(), 1);
        assert_eq!(to_index("H1").unwrap(), 8);
        assert_eq!(to_index("A2").unwrap(), 9);
        assert_eq!(to_index("H12").unwrap(), 96);
        assert_eq!(to_label(1).unwrap(), "A1");
        assert_eq!(to_label(8).unwrap(), "H1");
        assert_eq!(to_label(96).unwrap(), "H12");
    }

    #[test]
    fn lower_case_and_padding_are_accepted() {
        assert_eq!(to_index("c03").unwrap(), 19);
        assert_eq!(normalize("c03").unwrap(), "C3");
    }

    #[test]
    fn out_of_range_labels_fail() {
        for bad in ["", "A0", "A13", "I1", "1A", "AA"] {
            assert!(
                matches!(to_index(bad), Err(PipetteError::InvalidWellLabel(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn out_of_range_indices_fail() {
        assert!(matches!(to_label(0), Err(PipetteError::InvalidTipIndex(0))));
        assert!(matches!(to_label(97), Err(PipetteError::InvalidTipIndex(97))));
    }
}
