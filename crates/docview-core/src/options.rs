//! Row layout configuration.

use crate::error::RowCacheError;
use crate::geometry::Size;

/// Default page size (US Letter at 96 DPI) used until the paginator provides a better guess.
pub const DEFAULT_PAGE_SIZE: Size = Size::new(816.0, 1056.0);

/// Hard cap on the number of pages laid out on a single row.
pub const MAXIMUM_PAGES_ACROSS: usize = 32;

/// Decimal digits offsets are rounded to when mapping a vertical offset to a row.
pub const FIND_OFFSET_PRECISION: u32 = 2;

/// A row must show more than this many pixels to count as visible.
pub const VISIBLE_DELTA: f64 = 0.5;

/// Viewer-controlled layout parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RowLayoutOptions {
    /// Desired number of pages on the pivot row.
    pub columns: usize,
    /// Uniform zoom factor applied to every page size.
    pub scale: f64,
    /// Gutter added below every page (pixels, after scaling).
    pub vertical_page_spacing: f64,
    /// Gutter added to the right of every page (pixels, after scaling).
    pub horizontal_page_spacing: f64,
}

impl Default for RowLayoutOptions {
    fn default() -> Self {
        Self {
            columns: 1,
            scale: 1.0,
            vertical_page_spacing: 0.0,
            horizontal_page_spacing: 0.0,
        }
    }
}

impl RowLayoutOptions {
    /// Set the column count.
    pub fn with_columns(mut self, columns: usize) -> Self {
        self.columns = columns;
        self
    }

    /// Set the zoom factor.
    pub fn with_scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Set both page gutters.
    pub fn with_spacing(mut self, horizontal: f64, vertical: f64) -> Self {
        self.horizontal_page_spacing = horizontal;
        self.vertical_page_spacing = vertical;
        self
    }

    /// Check every field.
    ///
    /// Negative spacing is not an error (the row cache clamps it to zero), but NaN and infinite
    /// values are.
    pub fn validate(&self) -> Result<(), RowCacheError> {
        validate_columns(self.columns)?;
        validate_scale(self.scale)?;
        validate_spacing(self.vertical_page_spacing)?;
        validate_spacing(self.horizontal_page_spacing)?;
        Ok(())
    }
}

pub(crate) fn validate_columns(columns: usize) -> Result<usize, RowCacheError> {
    if columns == 0 || columns > MAXIMUM_PAGES_ACROSS {
        return Err(RowCacheError::InvalidColumns(columns));
    }
    Ok(columns)
}

pub(crate) fn validate_scale(scale: f64) -> Result<f64, RowCacheError> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(RowCacheError::InvalidScale(scale));
    }
    Ok(scale)
}

pub(crate) fn validate_spacing(spacing: f64) -> Result<f64, RowCacheError> {
    if !spacing.is_finite() {
        return Err(RowCacheError::InvalidSpacing(spacing));
    }
    Ok(spacing.max(0.0))
}
