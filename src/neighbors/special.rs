use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::Error;
use crate::system::SpecialBonds;

/// What to do with a pair of atoms which are 1-2, 1-3 or 1-4 bonded
/// neighbors of each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpecialPolicy {
    /// Do not emit the pair at all (scaling factor of exactly zero)
    Exclude,
    /// Emit the pair as a plain neighbor (scaling factor of exactly one)
    Plain,
    /// Emit the pair with its bond class encoded in the entry's high bits,
    /// for the force kernel to apply a partial scaling factor
    Scale,
}

/// Per-class special-bonds policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialSettings {
    pub one_two: SpecialPolicy,
    pub one_three: SpecialPolicy,
    pub one_four: SpecialPolicy,
}

impl Default for SpecialSettings {
    fn default() -> SpecialSettings {
        SpecialSettings {
            one_two: SpecialPolicy::Scale,
            one_three: SpecialPolicy::Scale,
            one_four: SpecialPolicy::Scale,
        }
    }
}

/// Result of checking one candidate pair against the bonded topology
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialCheck {
    /// Not a bonded neighbor, emit normally
    NotSpecial,
    /// Bonded neighbor with an `Exclude` policy, do not emit
    Excluded,
    /// Bonded neighbor to emit with this class (1 for 1-2, 2 for 1-3,
    /// 3 for 1-4) packed in the entry
    Scaled(u32),
}

/// Check whether the atom with global tag `tag_j` is a special neighbor of
/// the owned atom `i`, and how the pair must be handled.
pub fn find_special(
    special: &SpecialBonds,
    settings: SpecialSettings,
    i: usize,
    tag_j: i64,
) -> SpecialCheck {
    let (partners, counts) = special.partners_of(i);

    for (index, &tag) in partners.iter().enumerate() {
        if tag != tag_j {
            continue;
        }

        let (policy, class) = if index < counts[0] {
            (settings.one_two, 1)
        } else if index < counts[1] {
            (settings.one_three, 2)
        } else {
            (settings.one_four, 3)
        };

        return match policy {
            SpecialPolicy::Exclude => SpecialCheck::Excluded,
            SpecialPolicy::Plain => SpecialCheck::NotSpecial,
            SpecialPolicy::Scale => SpecialCheck::Scaled(class),
        };
    }

    return SpecialCheck::NotSpecial;
}

/// How molecule ids exclude pairs, for atoms belonging to a molecule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoleculePolicy {
    /// Exclude pairs of atoms sharing a molecule id
    Intra,
    /// Exclude pairs of atoms with different molecule ids
    Inter,
}

/// Group/type/molecule exclusion rules, checked before the special-bonds
/// topology and taking priority over it.
#[derive(Debug, Clone, Default)]
pub struct ExclusionRules {
    /// pairs of group bitmasks: a pair is excluded when one atom matches the
    /// first mask and the other atom the second
    group_pairs: Vec<(u32, u32)>,
    /// symmetric per-type-pair exclusions
    type_pairs: Option<Array2<bool>>,
    molecule: Option<MoleculePolicy>,
}

impl ExclusionRules {
    pub fn new() -> ExclusionRules {
        ExclusionRules::default()
    }

    /// Exclude all pairs between atoms matching `first` and atoms matching
    /// `second` group bitmasks
    pub fn exclude_groups(mut self, first: u32, second: u32) -> ExclusionRules {
        self.group_pairs.push((first, second));
        return self;
    }

    /// Exclude all pairs between atoms of the two given types
    pub fn exclude_types(mut self, ntypes: usize, first: i32, second: i32) -> Result<ExclusionRules, Error> {
        let (first, second) = (first as usize, second as usize);
        if first >= ntypes || second >= ntypes {
            return Err(Error::InvalidParameter(format!(
                "excluded type pair ({}, {}) is out of range for {} types",
                first, second, ntypes
            )));
        }

        let table = self.type_pairs.get_or_insert_with(|| Array2::default((ntypes, ntypes)));
        if table.nrows() != ntypes {
            return Err(Error::InvalidParameter(
                "all excluded type pairs must use the same number of types".into()
            ));
        }
        table[(first, second)] = true;
        table[(second, first)] = true;
        return Ok(self);
    }

    /// Exclude pairs according to their molecule ids
    pub fn exclude_molecule(mut self, policy: MoleculePolicy) -> ExclusionRules {
        self.molecule = Some(policy);
        return self;
    }

    /// Are there any rules to check at all?
    pub fn is_empty(&self) -> bool {
        self.group_pairs.is_empty() && self.type_pairs.is_none() && self.molecule.is_none()
    }

    /// Check whether the candidate pair is excluded outright
    pub fn excluded(
        &self,
        itype: i32,
        jtype: i32,
        imask: u32,
        jmask: u32,
        imolecule: i64,
        jmolecule: i64,
    ) -> bool {
        for &(first, second) in &self.group_pairs {
            if (imask & first != 0 && jmask & second != 0)
                || (imask & second != 0 && jmask & first != 0)
            {
                return true;
            }
        }

        if let Some(table) = &self.type_pairs {
            if table[(itype as usize, jtype as usize)] {
                return true;
            }
        }

        if let Some(policy) = self.molecule {
            if imolecule >= 0 && jmolecule >= 0 {
                match policy {
                    MoleculePolicy::Intra if imolecule == jmolecule => return true,
                    MoleculePolicy::Inter if imolecule != jmolecule => return true,
                    _ => {}
                }
            }
        }

        return false;
    }
}
