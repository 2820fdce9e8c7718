//! Selection vectors: byte-per-row masks and compacted `u16` index arrays.

use arrow::array::BooleanArray;

use crate::error::ScanError;

/// Compacts `sel[..sel_size]` in place, keeping the indices for which `pass`
/// answers true. Returns the new size.
///
/// Every index is written at the output cursor and the cursor advances by the
/// test result, so the loop carries no branch on the outcome.
#[inline]
pub fn compact_branchless<F>(sel: &mut [u16], sel_size: u16, mut pass: F) -> u16
where
    F: FnMut(usize) -> bool,
{
    let mut new_size = 0_usize;
    for i in 0..usize::from(sel_size) {
        let idx = sel[i];
        sel[new_size] = idx;
        new_size += usize::from(pass(usize::from(idx)));
    }
    // new_size <= sel_size, which fits in u16
    new_size as u16
}

/// Checks that `[from, to)` addresses `sel` and a column of `rows` rows.
pub(crate) fn check_range(sel_len: usize, rows: usize, from: usize, to: usize) -> Result<(), ScanError> {
    if from > to || to > sel_len || to > rows {
        return Err(ScanError::invalid(format!(
            "row range [{from}, {to}) out of bounds for {rows} rows and selection of {sel_len}"
        )));
    }
    Ok(())
}

/// Checks that the first `sel_size` indices of `sel` address a column of `rows`
/// rows.
pub(crate) fn check_indices(sel: &[u16], sel_size: u16, rows: usize) -> Result<(), ScanError> {
    let size = usize::from(sel_size);
    if size > sel.len() {
        return Err(ScanError::invalid(format!(
            "selection size {size} exceeds buffer of {}",
            sel.len()
        )));
    }
    if let Some(max) = sel[..size].iter().max() {
        if usize::from(*max) >= rows {
            return Err(ScanError::invalid(format!(
                "selected row {max} out of bounds for {rows} rows"
            )));
        }
    }
    Ok(())
}

/// Number of set entries in a 0/1 mask.
#[must_use]
pub fn selected_count(sel: &[u8]) -> usize {
    sel.iter().map(|flag| usize::from(*flag)).sum()
}

/// Arrow boolean filter for a mask.
#[must_use]
pub fn mask_to_boolean_array(sel: &[u8]) -> BooleanArray {
    sel.iter().map(|flag| Some(*flag != 0)).collect()
}

/// Identity index array `[0, len)` used to seed branchless evaluation.
#[must_use]
pub fn identity_indices(len: u16) -> Vec<u16> {
    (0..len).collect()
}
