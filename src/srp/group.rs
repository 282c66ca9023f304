//! RFC 5054 Appendix A safe-prime groups.
//!
//! Values are copied verbatim from the RFC (generator `2` for every
//! supported bit-size); the derived multiplier `k` follows RFC 5054 §2.5.3:
//! `k = SHA1(N || PAD(g, |N|))`, where `N` itself is *not* padded — only the
//! generator is padded to the group's byte length.

use num_bigint::BigUint;
use num_traits::Num;
use sha1::{Digest, Sha1};
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SrpGroupName {
    Small,
    Medium,
    Large,
}

impl SrpGroupName {
    pub fn as_str(self) -> &'static str {
        match self {
            SrpGroupName::Small => "small",
            SrpGroupName::Medium => "medium",
            SrpGroupName::Large => "large",
        }
    }
}

impl std::str::FromStr for SrpGroupName {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "small" => Ok(SrpGroupName::Small),
            "medium" => Ok(SrpGroupName::Medium),
            "large" => Ok(SrpGroupName::Large),
            other => Err(anyhow::anyhow!("unknown SRP group name: {other}")),
        }
    }
}

/// An immutable SRP group: bit-size, safe prime `N`, generator `g`, and the
/// derived multiplier `k`.
pub struct SrpGroup {
    pub bits: usize,
    pub n: BigUint,
    pub g: BigUint,
    pub k: BigUint,
}

impl SrpGroup {
    fn build(bits: usize, hex_n: &str, generator: u32) -> Self {
        let clean: String = hex_n.chars().filter(|c| !c.is_whitespace()).collect();
        let n = BigUint::from_str_radix(&clean, 16).expect("hard-coded RFC 5054 prime must parse");
        let g = BigUint::from(generator);
        let k = derive_multiplier(bits, &n, &g);
        Self { bits, n, g, k }
    }

    /// The byte length of this group's modulus (`|N|` in the RFC's notation).
    pub fn byte_len(&self) -> usize {
        self.bits / 8
    }

    pub fn for_name(name: SrpGroupName) -> &'static SrpGroup {
        match name {
            SrpGroupName::Small => small(),
            SrpGroupName::Medium => medium(),
            SrpGroupName::Large => large(),
        }
    }
}

fn derive_multiplier(bits: usize, n: &BigUint, g: &BigUint) -> BigUint {
    let padded_g = left_pad(&g.to_bytes_be(), bits / 8);
    let mut predigest = n.to_bytes_be();
    predigest.extend_from_slice(&padded_g);
    let digest = Sha1::digest(&predigest);
    BigUint::from_bytes_be(&digest)
}

/// Left-pad a big-endian byte slice with zeroes up to `len` bytes.
/// Used throughout the SRP engine for `PAD(x, n)`.
pub fn left_pad(bytes: &[u8], len: usize) -> Vec<u8> {
    if bytes.len() >= len {
        return bytes.to_vec();
    }
    let mut out = vec![0u8; len - bytes.len()];
    out.extend_from_slice(bytes);
    out
}

const SMALL_N_HEX: &str = "\
    EEAF0AB9 ADB38DD6 9C33F80A FA8FC5E8 60726187 75FF3C0B 9EA2314C 9C256576 \
    D674DF74 96EA81D3 383B4813 D692C6E0 E0D5D8E2 50B98BE4 8E495C1D 6089DAD1 \
    5DC7D7B4 6154D6B6 CE8EF4AD 69B15D49 82559B29 7BCF1885 C529F566 660E57EC \
    68EDBC3C 05726CC0 2FD4CBF4 976EAA9A FD5138FE 8376435B 9FC61D2F C0EB06E3";

const MEDIUM_N_HEX: &str = "\
    9DEF3CAF B939277A B1F12A86 17A47BBB DBA51DF4 99AC4C80 BEEEA961 4B19CC4D \
    5F4F5F55 6E27CBDE 51C6A94B E4607A29 1558903B A0D0F843 80B655BB 9A22E8DC \
    DF028A7C EC67F0D0 8134B1C8 B9798914 9B609E0B E3BAB63D 47548381 DBC5B1FC \
    764E3F4B 53DD9DA1 158BFD3E 2B9C8CF5 6EDF0195 39349627 DB2FD53D 24B7C486 \
    65772E43 7D6C7F8C E442734A F7CCB7AE 837C264A E3A9BEB8 7F8A2FE9 B8B5292E \
    5A021FFF 5E91479E 8CE7A28C 2442C6F3 15180F93 499A234D CF76E3FE D135F9BB";

const LARGE_N_HEX: &str = "\
    AC6BDB41 324A9A9B F166DE5E 1389582F AF72B665 1987EE07 FC319294 3DB56050 \
    A37329CB B4A099ED 8193E075 7767A13D D52312AB 4B03310D CD7F48A9 DA04FD50 \
    E8083969 EDB767B0 CF609517 9A163AB3 661A05FB D5FAAAE8 2918A996 2F0B93B8 \
    55F97993 EC975EEA A80D740A DBF4FF74 7359D041 D5C33EA7 1D281E44 6B14773B \
    CA97B43A 23FB8016 76BD207A 436C6481 F1D2B907 8717461A 5B9D32E6 88F87748 \
    544523B5 24B0D57D 5EA77A27 75D2ECFA 032CFBDB F52FB378 61602790 04E57AE6 \
    AF874E73 03CE5329 9CCC041C 7BC308D8 2A5698F3 A8D0C382 71AE35F8 E9DBFBB6 \
    94B5C803 D89F7AE4 35DE236D 525F5475 9B65E372 FCD68EF2 0FA7111F 9E4AFF73";

fn small() -> &'static SrpGroup {
    static CELL: OnceLock<SrpGroup> = OnceLock::new();
    CELL.get_or_init(|| SrpGroup::build(1024, SMALL_N_HEX, 2))
}

fn medium() -> &'static SrpGroup {
    static CELL: OnceLock<SrpGroup> = OnceLock::new();
    CELL.get_or_init(|| SrpGroup::build(1536, MEDIUM_N_HEX, 2))
}

fn large() -> &'static SrpGroup {
    static CELL: OnceLock<SrpGroup> = OnceLock::new();
    CELL.get_or_init(|| SrpGroup::build(2048, LARGE_N_HEX, 2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_group_has_expected_bit_size() {
        let g = SrpGroup::for_name(SrpGroupName::Small);
        assert_eq!(g.bits, 1024);
        assert_eq!(g.byte_len(), 128);
        assert_eq!(g.g, BigUint::from(2u32));
    }

    #[test]
    fn groups_are_cached_singletons() {
        let a = SrpGroup::for_name(SrpGroupName::Small) as *const SrpGroup;
        let b = SrpGroup::for_name(SrpGroupName::Small) as *const SrpGroup;
        assert_eq!(a, b);
    }

    #[test]
    fn left_pad_adds_leading_zeroes() {
        assert_eq!(left_pad(&[1, 2], 4), vec![0, 0, 1, 2]);
        assert_eq!(left_pad(&[1, 2, 3, 4], 2), vec![1, 2, 3, 4]);
    }

    #[test]
    fn group_name_round_trips_through_str() {
        use std::str::FromStr;
        assert_eq!(SrpGroupName::from_str("medium").unwrap(), SrpGroupName::Medium);
        assert!(SrpGroupName::from_str("huge").is_err());
    }
}
