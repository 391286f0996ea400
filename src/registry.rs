//! Built-in rule table
//!
//! Maps each rule id to its metadata and check function. Every check runs
//! the shared classifier and keeps only findings for its own rule, so the
//! four entries never disagree about a loop. The engine classifies each
//! loop once itself and hands the finding to the entry it names.

use crate::classify::{classify, Finding};
use crate::resolver::TypeResolver;
use crate::rule::{Rule, RuleId};
use crate::syntax::LoopNode;
use std::fmt;
use std::sync::OnceLock;

/// Check function signature shared by all rules
pub type CheckFn = fn(&LoopNode, &dyn TypeResolver) -> Option<Finding>;

/// One registered rule
#[derive(Clone)]
pub struct RuleEntry {
    pub rule: Rule,
    pub check: CheckFn,
}

impl fmt::Debug for RuleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleEntry")
            .field("rule", &self.rule)
            .finish_non_exhaustive()
    }
}

impl RuleEntry {
    pub fn id(&self) -> RuleId {
        self.rule.id
    }

    pub fn run(&self, node: &LoopNode, resolver: &dyn TypeResolver) -> Option<Finding> {
        (self.check)(node, resolver)
    }
}

fn check_foreach_for_array(node: &LoopNode, resolver: &dyn TypeResolver) -> Option<Finding> {
    classify(node, resolver).filter(|f| f.rule == RuleId::LoopPrefersForeachForArray)
}

fn check_for_for_list(node: &LoopNode, resolver: &dyn TypeResolver) -> Option<Finding> {
    classify(node, resolver).filter(|f| f.rule == RuleId::LoopPrefersForForList)
}

fn check_for_for_array(node: &LoopNode, resolver: &dyn TypeResolver) -> Option<Finding> {
    classify(node, resolver).filter(|f| f.rule == RuleId::LoopPrefersForForArray)
}

fn check_foreach_for_list(node: &LoopNode, resolver: &dyn TypeResolver) -> Option<Finding> {
    classify(node, resolver).filter(|f| f.rule == RuleId::LoopPrefersForeachForList)
}

/// All built-in rules, in code order
pub fn builtin_rules() -> &'static [RuleEntry] {
    static RULES: OnceLock<Vec<RuleEntry>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            RuleEntry {
                rule: Rule::new(
                    RuleId::LoopPrefersForeachForArray,
                    "Prefer foreach for arrays",
                    "Indexed 'for' loop bounded by an array's Length",
                )
                .with_rationale(
                    "The JIT removes bounds checks from 'foreach' over arrays, and the element \
                     variable states the intent without index bookkeeping.",
                )
                .with_example_bad("for (int i = 0; i < arr.Length; i++) { sum += arr[i]; }")
                .with_example_good("foreach (var item in arr) { sum += item; }")
                .with_related(RuleId::LoopPrefersForForArray),
                check: check_foreach_for_array,
            },
            RuleEntry {
                rule: Rule::new(
                    RuleId::LoopPrefersForForList,
                    "Prefer for for lists",
                    "'foreach' over a List can be written as an indexed loop",
                )
                .with_rationale(
                    "Indexed access on List<T> skips the enumerator's version checks.",
                )
                .with_example_bad("foreach (var x in list) { sum += x; }")
                .with_example_good("for (int i = 0; i < list.Count; i++) { sum += list[i]; }")
                .with_related(RuleId::LoopPrefersForeachForList),
                check: check_for_for_list,
            },
            RuleEntry {
                rule: Rule::new(
                    RuleId::LoopPrefersForForArray,
                    "Prefer for for arrays",
                    "'foreach' over an array can be written as an indexed loop",
                )
                .with_rationale("Indexed access on arrays avoids enumerator overhead.")
                .with_example_bad("foreach (var x in arr) { Use(x); }")
                .with_example_good("for (int i = 0; i < arr.Length; i++) { Use(arr[i]); }")
                .with_related(RuleId::LoopPrefersForeachForArray),
                check: check_for_for_array,
            },
            RuleEntry {
                rule: Rule::new(
                    RuleId::LoopPrefersForeachForList,
                    "Prefer foreach for read-only list loops",
                    "Indexed 'for' loop over a List that never writes back into the list",
                )
                .with_rationale(
                    "When no element is assigned through the index, the index adds nothing. \
                     Loops that write 'list[i] = ...' are not reported.",
                )
                .with_example_bad("for (int i = 0; i < list.Count; i++) { Print(list[i]); }")
                .with_example_good("foreach (var item in list) { Print(item); }")
                .with_related(RuleId::LoopPrefersForForList),
                check: check_foreach_for_list,
            },
        ]
    })
}

/// Look up a rule by id or code
pub fn find_rule(name: &str) -> Option<&'static RuleEntry> {
    let id: RuleId = name.parse().ok()?;
    builtin_rules().iter().find(|entry| entry.id() == id)
}
