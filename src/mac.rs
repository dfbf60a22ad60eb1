//! Node identifiers.
//!
//! A [`Mac`] is a 6-byte opaque identifier, generated locally at boot from a
//! cryptographically seeded random source. The mesh has no central
//! authority to hand out addresses, so uniqueness is probabilistic: with a
//! 48-bit random value, collisions within any single mesh are vanishingly
//! unlikely.

use core::fmt;

use rand::RngCore;

/// Length in bytes of a [`Mac`] on the wire.
pub const MAC_LEN: usize = 6;

/// A 6-byte node identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Mac(pub [u8; MAC_LEN]);

impl Mac {
    /// Generate a new random MAC using the provided RNG.
    ///
    /// Call sites should pass a cryptographically seeded RNG
    /// (`rand::rngs::OsRng` or equivalent) at boot.
    pub fn generate<R: RngCore>(rng: &mut R) -> Self {
        let mut buf = [0u8; MAC_LEN];
        rng.fill_bytes(&mut buf);
        Mac(buf)
    }

    /// View this MAC as a byte slice.
    pub fn as_bytes(&self) -> &[u8; MAC_LEN] {
        &self.0
    }

    /// Build a MAC from a fixed byte array (used for known/test addresses).
    pub const fn from_bytes(bytes: [u8; MAC_LEN]) -> Self {
        Mac(bytes)
    }
}

impl fmt::Debug for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Mac({})", self)
    }
}

impl fmt::Display for Mac {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02X}", b)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn generate_is_deterministic_given_seed() {
        let mut a = StdRng::seed_from_u64(1);
        let mut b = StdRng::seed_from_u64(1);
        assert_eq!(Mac::generate(&mut a), Mac::generate(&mut b));
    }

    #[test]
    fn display_is_uppercase_hex() {
        let mac = Mac::from_bytes([0xaa, 0xbb, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(format!("{}", mac), "AABB01020304");
    }
}
