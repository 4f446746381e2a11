// Copyright 2024 Entanglement Contributors
// SPDX-License-Identifier: Apache-2.0, MIT

use serde::{Deserialize, Serialize};

use crate::entangler::Error;
use crate::parity::MAX_STRANDS;

/// Configuration for the entangler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// The number of parity chains to generate. `0` disables entanglement.
    pub alpha: u8,
    /// The height of the lattice, i.e. the number of horizontal strands.
    pub s: u8,
    /// The helical period: the number of columns a window spans.
    pub p: u8,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            alpha: 3,
            s: 5,
            p: 5,
        }
    }
}

impl Config {
    /// Creates a new `Config` with the given parameters.
    ///
    /// # Arguments
    ///
    /// * `alpha` - The number of parity chains to generate.
    /// * `s` - The number of horizontal strands in the lattice.
    /// * `p` - The helical period of the lattice.
    ///
    /// # Returns
    ///
    /// A new `Config` with the given parameters. It is not validated.
    pub fn new(alpha: u8, s: u8, p: u8) -> Self {
        Self { alpha, s, p }
    }

    /// Number of positions in a lattice window, `s * p`.
    pub fn window_size(&self) -> u64 {
        self.s as u64 * self.p as u64
    }

    /// Whether uploads under this configuration produce parity at all.
    pub fn entangles(&self) -> bool {
        self.alpha > 0
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.s == 0 {
            return Err(Error::InvalidEntanglementParameter("s".to_string(), 0));
        }
        if self.p == 0 {
            return Err(Error::InvalidEntanglementParameter("p".to_string(), 0));
        }
        if self.alpha as usize > MAX_STRANDS {
            return Err(Error::TooManyStrands(self.alpha, MAX_STRANDS));
        }
        Ok(())
    }
}
