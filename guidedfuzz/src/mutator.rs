//! Two-tier probabilistic mutation of genes.
//!
//! Arguments the current strategy flags are redrawn with the high-priority
//! probability; everything else, including the transaction environment, uses
//! the background probability.

use rand::Rng;
use slog::{Discard, Logger, o, trace};
use std::collections::BTreeMap;
use std::ops::AddAssign;

use crate::constants::{DEFAULT_BACKGROUND_PROBABILITY, DEFAULT_HIGH_PRIORITY_PROBABILITY};
use crate::gene::{Gene, ValueSource};
use crate::reconciler::MutationTargetMap;
use crate::signature::{FunctionKey, Interface, SignatureIndex};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MutationPolicy {
    pub background: f64,
    pub high_priority: f64,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        Self {
            background: DEFAULT_BACKGROUND_PROBABILITY,
            high_priority: DEFAULT_HIGH_PRIORITY_PROBABILITY,
        }
    }
}

/// How many fields a mutation pass replaced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReport {
    pub targeted_arguments: usize,
    pub background_arguments: usize,
    pub environment: usize,
}

impl MutationReport {
    pub fn total(&self) -> usize {
        self.targeted_arguments + self.background_arguments + self.environment
    }
}

impl AddAssign for MutationReport {
    fn add_assign(&mut self, other: Self) {
        self.targeted_arguments += other.targeted_arguments;
        self.background_arguments += other.background_arguments;
        self.environment += other.environment;
    }
}

pub struct GeneMutator<'a> {
    index: &'a SignatureIndex,
    interface: &'a Interface,
    policy: MutationPolicy,
    log: Logger,
}

fn draw<R: Rng + ?Sized>(rng: &mut R, probability: f64) -> bool {
    rng.random::<f64>() < probability
}

impl<'a> GeneMutator<'a> {
    pub fn new(index: &'a SignatureIndex, interface: &'a Interface, policy: MutationPolicy) -> Self {
        Self {
            index,
            interface,
            policy,
            log: Logger::root(Discard, o!()),
        }
    }

    pub fn with_logger(mut self, log: Logger) -> Self {
        self.log = log;
        self
    }

    pub fn policy(&self) -> MutationPolicy {
        self.policy
    }

    /// Mutates one gene in place. Without `targets` (or for a function the
    /// index cannot resolve) only the background probability applies.
    pub fn mutate_gene<V, R>(
        &self,
        gene: &mut Gene,
        targets: Option<&MutationTargetMap>,
        source: &mut V,
        rng: &mut R,
    ) -> MutationReport
    where
        V: ValueSource + ?Sized,
        R: Rng + ?Sized,
    {
        let mut report = MutationReport::default();
        let function = gene.function;
        let signature = self.index.info(&function);
        let expected = self.interface.expected_types(&function).unwrap_or(&[]);

        for (index, argument) in gene.arguments.iter_mut().enumerate() {
            let Some(ty) = expected.get(index) else {
                continue;
            };
            let targeted = match (targets, signature) {
                (Some(targets), Some(signature)) => signature
                    .param_names
                    .get(index)
                    .is_some_and(|param| targets.is_target(&signature.name, param)),
                _ => false,
            };
            let probability = if targeted {
                self.policy.high_priority
            } else {
                self.policy.background
            };
            if draw(rng, probability) {
                *argument = source.random_argument(ty, &function, index);
                if targeted {
                    report.targeted_arguments += 1;
                } else {
                    report.background_arguments += 1;
                }
            }
        }

        report.environment = self.mutate_environment(gene, source, rng);
        trace!(self.log, "Mutated gene";
            "function" => %function,
            "targeted" => report.targeted_arguments,
            "background" => report.background_arguments,
            "environment" => report.environment);
        report
    }

    /// Applies [`Self::mutate_gene`] to every gene of an individual.
    pub fn mutate_individual<V, R>(
        &self,
        chromosome: &mut [Gene],
        targets: Option<&MutationTargetMap>,
        source: &mut V,
        rng: &mut R,
    ) -> MutationReport
    where
        V: ValueSource + ?Sized,
        R: Rng + ?Sized,
    {
        let mut report = MutationReport::default();
        for gene in chromosome.iter_mut() {
            report += self.mutate_gene(gene, targets, source, rng);
        }
        report
    }

    /// The transaction environment, identical for guided and unguided
    /// mutation. Of `account`, `amount` and `gaslimit` at most one changes per
    /// pass: the first present field whose draw succeeds.
    fn mutate_environment<V, R>(&self, gene: &mut Gene, source: &mut V, rng: &mut R) -> usize
    where
        V: ValueSource + ?Sized,
        R: Rng + ?Sized,
    {
        let p = self.policy.background;
        let function = gene.function;
        let mut changed = 0;

        if gene.account.is_some() && draw(rng, p) {
            gene.account = Some(source.random_account());
            changed += 1;
        } else if gene.amount.is_some() && draw(rng, p) {
            gene.amount = Some(source.random_amount(&function));
            changed += 1;
        } else if gene.gaslimit.is_some() && draw(rng, p) {
            gene.gaslimit = Some(source.random_gaslimit());
            changed += 1;
        }

        if gene.timestamp.is_none() || draw(rng, p) {
            gene.timestamp = Some(source.random_timestamp());
            changed += 1;
        }
        if gene.blocknumber.is_none() || draw(rng, p) {
            gene.blocknumber = Some(source.random_blocknumber());
            changed += 1;
        }
        if gene.balance.is_none() || draw(rng, p) {
            gene.balance = Some(source.random_balance());
            changed += 1;
        }

        for field in AddressField::ALL {
            changed += mutate_address_map(gene, field, p, source, rng);
        }
        changed
    }
}

/// The per-address environment maps of a gene.
#[derive(Debug, Clone, Copy)]
enum AddressField {
    CallReturn,
    ExtCodeSize,
    ReturnDataSize,
}

impl AddressField {
    const ALL: [AddressField; 3] = [
        AddressField::CallReturn,
        AddressField::ExtCodeSize,
        AddressField::ReturnDataSize,
    ];

    fn map<'g>(&self, gene: &'g mut Gene) -> &'g mut Option<BTreeMap<String, u64>> {
        match self {
            AddressField::CallReturn => &mut gene.call_return,
            AddressField::ExtCodeSize => &mut gene.extcodesize,
            AddressField::ReturnDataSize => &mut gene.returndatasize,
        }
    }

    fn value<V: ValueSource + ?Sized>(&self, source: &mut V, function: &FunctionKey, address: &str) -> u64 {
        match self {
            AddressField::CallReturn => source.random_call_return(function, address),
            AddressField::ExtCodeSize => source.random_extcodesize(function, address),
            AddressField::ReturnDataSize => source.random_returndatasize(function, address),
        }
    }

    fn entry<V: ValueSource + ?Sized>(&self, source: &mut V, function: &FunctionKey) -> (String, u64) {
        match self {
            AddressField::CallReturn => source.random_call_return_entry(function),
            AddressField::ExtCodeSize => source.random_extcodesize_entry(function),
            AddressField::ReturnDataSize => source.random_returndatasize_entry(function),
        }
    }
}

/// Redraws each entry of an existing map, or creates the map with one
/// generated entry.
fn mutate_address_map<V, R>(
    gene: &mut Gene,
    field: AddressField,
    probability: f64,
    source: &mut V,
    rng: &mut R,
) -> usize
where
    V: ValueSource + ?Sized,
    R: Rng + ?Sized,
{
    let function = gene.function;
    let map = field.map(gene);
    match map {
        Some(entries) => {
            let mut changed = 0;
            for (address, value) in entries.iter_mut() {
                if draw(rng, probability) {
                    *value = field.value(source, &function, address);
                    changed += 1;
                }
            }
            changed
        }
        None => {
            let (address, value) = field.entry(source, &function);
            *map = Some(BTreeMap::from([(address, value)]));
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abi::{Abi, AbiEntry, AbiParam, AbiType};
    use crate::signature::Selector;
    use crate::value::AbiValue;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Returns recognisable values and records which arguments were redrawn.
    #[derive(Default)]
    struct RecordingSource {
        redrawn: Vec<(FunctionKey, usize)>,
    }

    impl ValueSource for RecordingSource {
        fn random_argument(&mut self, _ty: &AbiType, function: &FunctionKey, index: usize) -> AbiValue {
            self.redrawn.push((*function, index));
            AbiValue::from(999)
        }
        fn random_account(&mut self) -> String {
            "0xacc".to_string()
        }
        fn random_amount(&mut self, _function: &FunctionKey) -> u128 {
            77
        }
        fn random_gaslimit(&mut self) -> u64 {
            21_000
        }
        fn random_timestamp(&mut self) -> u64 {
            123
        }
        fn random_blocknumber(&mut self) -> u64 {
            456
        }
        fn random_balance(&mut self) -> u128 {
            789
        }
        fn random_call_return(&mut self, _function: &FunctionKey, _address: &str) -> u64 {
            1
        }
        fn random_call_return_entry(&mut self, _function: &FunctionKey) -> (String, u64) {
            ("0xc0".to_string(), 1)
        }
        fn random_extcodesize(&mut self, _function: &FunctionKey, _address: &str) -> u64 {
            2
        }
        fn random_extcodesize_entry(&mut self, _function: &FunctionKey) -> (String, u64) {
            ("0xc1".to_string(), 2)
        }
        fn random_returndatasize(&mut self, _function: &FunctionKey, _address: &str) -> u64 {
            3
        }
        fn random_returndatasize_entry(&mut self, _function: &FunctionKey) -> (String, u64) {
            ("0xc2".to_string(), 3)
        }
    }

    fn token() -> (SignatureIndex, Interface) {
        let abi = Abi::new(vec![AbiEntry::function(
            "transfer",
            vec![
                AbiParam::new("to", "address"),
                AbiParam::new("amount", "uint256"),
            ],
        )]);
        let interface = Interface::from_abi(&abi);
        (SignatureIndex::from_abi(&abi, &interface), interface)
    }

    fn transfer_gene() -> Gene {
        let key = Selector::from_signature("transfer(address,uint256)").into();
        let mut gene = Gene::new(key, vec![AbiValue::Raw("0xaa".into()), AbiValue::from(5)]);
        gene.amount = Some(0);
        gene.timestamp = Some(1);
        gene.blocknumber = Some(1);
        gene.balance = Some(1);
        gene.call_return = Some(BTreeMap::new());
        gene.extcodesize = Some(BTreeMap::new());
        gene.returndatasize = Some(BTreeMap::new());
        gene
    }

    #[test]
    fn only_targeted_argument_changes() {
        let (index, interface) = token();
        let policy = MutationPolicy {
            background: 0.0,
            high_priority: 1.0,
        };
        let mutator = GeneMutator::new(&index, &interface, policy);
        let targets: MutationTargetMap = [("transfer", ["amount"])].into_iter().collect();
        let mut source = RecordingSource::default();
        let mut rng = StdRng::seed_from_u64(0);

        let mut gene = transfer_gene();
        let before = gene.clone();
        let report = mutator.mutate_gene(&mut gene, Some(&targets), &mut source, &mut rng);

        assert_eq!(report.targeted_arguments, 1);
        assert_eq!(report.total(), 1);
        assert_eq!(gene.arguments[0], before.arguments[0]);
        assert_eq!(gene.arguments[1], AbiValue::from(999));
        assert_eq!(source.redrawn, vec![(gene.function, 1)]);
        assert_eq!(gene.timestamp, before.timestamp);
    }

    #[test]
    fn without_targets_background_applies() {
        let (index, interface) = token();
        let mutator = GeneMutator::new(
            &index,
            &interface,
            MutationPolicy {
                background: 1.0,
                high_priority: 0.0,
            },
        );
        let mut source = RecordingSource::default();
        let mut rng = StdRng::seed_from_u64(0);
        let mut gene = transfer_gene();
        gene.call_return = Some(BTreeMap::from([("0xdd".to_string(), 0)]));

        let report = mutator.mutate_gene(&mut gene, None, &mut source, &mut rng);
        assert_eq!(report.background_arguments, 2);
        assert_eq!(gene.amount, Some(77));
        assert_eq!(gene.timestamp, Some(123));
        assert_eq!(gene.call_return, Some(BTreeMap::from([("0xdd".to_string(), 1)])));
    }

    #[test]
    fn absent_environment_is_generated() {
        let (index, interface) = token();
        let mutator = GeneMutator::new(
            &index,
            &interface,
            MutationPolicy {
                background: 0.0,
                high_priority: 0.0,
            },
        );
        let mut source = RecordingSource::default();
        let mut rng = StdRng::seed_from_u64(0);
        let key = Selector::from_signature("transfer(address,uint256)").into();
        let mut gene = Gene::new(key, vec![AbiValue::Raw("0xaa".into()), AbiValue::from(5)]);

        let report = mutator.mutate_gene(&mut gene, None, &mut source, &mut rng);
        assert_eq!(report.environment, 6);
        assert_eq!(gene.account, None);
        assert_eq!(gene.amount, None);
        assert_eq!(gene.blocknumber, Some(456));
        assert_eq!(gene.balance, Some(789));
        assert_eq!(gene.extcodesize, Some(BTreeMap::from([("0xc1".to_string(), 2)])));
        assert_eq!(gene.returndatasize.as_ref().map(BTreeMap::len), Some(1));
    }

    #[test]
    fn unknown_function_and_untyped_arguments_are_left_alone() {
        let (index, interface) = token();
        let mutator = GeneMutator::new(
            &index,
            &interface,
            MutationPolicy {
                background: 1.0,
                high_priority: 1.0,
            },
        );
        let mut source = RecordingSource::default();
        let mut rng = StdRng::seed_from_u64(0);
        let targets: MutationTargetMap = [("transfer", ["to", "amount"])].into_iter().collect();

        let mut unknown = Gene::new(FunctionKey::Fallback, vec![AbiValue::from(1)]);
        let report = mutator.mutate_gene(&mut unknown, Some(&targets), &mut source, &mut rng);
        assert_eq!(report.targeted_arguments + report.background_arguments, 0);
        assert_eq!(unknown.arguments, vec![AbiValue::from(1)]);

        let mut individual = vec![transfer_gene(), transfer_gene()];
        let report = mutator.mutate_individual(&mut individual, Some(&targets), &mut source, &mut rng);
        assert_eq!(report.targeted_arguments, 4);
        assert_eq!(source.redrawn.len(), 4);
    }
}
