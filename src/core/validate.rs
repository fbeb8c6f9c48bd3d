use crate::types::{Band, EspaError, EspaResult, RasterSet};

/// Consistency checks run on every constructed record before it is returned.
pub trait Validate {
    fn validate(&self) -> EspaResult<()>;
}

impl Validate for Band {
    fn validate(&self) -> EspaResult<()> {
        if self.name.trim().is_empty() {
            return Err(EspaError::Validation(format!(
                "Band from '{}' has no name",
                self.file_name
            )));
        }

        if self.file_name.trim().is_empty() {
            return Err(EspaError::Validation(format!(
                "Band '{}' has no file_name",
                self.name
            )));
        }

        let (rows, cols) = self.data.dim();
        if let Some(nlines) = self.nlines {
            if nlines != rows {
                return Err(EspaError::Validation(format!(
                    "Band '{}' declares {} lines but its image has {}",
                    self.name, nlines, rows
                )));
            }
        }
        if let Some(nsamps) = self.nsamps {
            if nsamps != cols {
                return Err(EspaError::Validation(format!(
                    "Band '{}' declares {} samples but its image has {}",
                    self.name, nsamps, cols
                )));
            }
        }

        if let Some(range) = &self.valid_range {
            if range.min > range.max {
                return Err(EspaError::Validation(format!(
                    "Band '{}' has valid_range min {} above max {}",
                    self.name, range.min, range.max
                )));
            }
        }

        Ok(())
    }
}

impl Validate for RasterSet {
    fn validate(&self) -> EspaResult<()> {
        if self.bands.is_empty() {
            return Err(EspaError::Validation("Raster set has no bands".to_string()));
        }

        for (key, band) in &self.bands {
            if key != &band.name {
                return Err(EspaError::Validation(format!(
                    "Band stored as '{}' is named '{}'",
                    key, band.name
                )));
            }
            band.validate()?;
        }

        Ok(())
    }
}
