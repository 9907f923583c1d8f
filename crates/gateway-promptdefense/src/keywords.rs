use std::sync::LazyLock;

use regex::RegexSet;

/// Layer 2: a fixed blocklist of injection-attempt phrasings. Case
/// insensitivity and `match anywhere` are both handled by the `(?i)` inline
/// flag rather than per-pattern flags, kept on one `RegexSet` so a match
/// against many phrases costs one scan instead of N.
static BLOCKLIST: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)ignore (all )?(previous|prior|above) instructions",
        r"(?i)disregard (all )?(previous|prior|above) (instructions|rules|prompts)",
        r"(?i)forget (everything|all) (you('ve| have))? (been told|learned)",
        r"(?i)you are now (a|an|in) .*(mode|persona|character)",
        r"(?i)act as (if you are|a|an) .*(unfiltered|unrestricted|jailbroken)",
        r"(?i)developer mode",
        r"(?i)dan mode",
        r"(?i)pretend (you have no|there are no) (restrictions|rules|filters)",
        r"(?i)reveal (your|the) (system prompt|instructions)",
        r"(?i)print (your|the) (system prompt|initial instructions)",
        r"(?i)what (are|were) your (original |initial )?instructions",
        r"(?i)repeat (the text|everything) above",
    ])
    .expect("blocklist patterns are valid regexes")
});

pub fn is_blocked(input: &str) -> bool {
    BLOCKLIST.is_match(input)
}
