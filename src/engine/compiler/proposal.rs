// Locate and parse a proposal block embedded in model output.

use crate::atoms::constants::{PROPOSAL_END_MARKER, PROPOSAL_START_MARKER};
use crate::atoms::error::{EngineError, EngineResult};
use crate::atoms::soul_types::Proposal;
use regex::Regex;
use std::sync::LazyLock;

static PROPOSAL_BLOCK: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(&format!(
        "(?s){}(.*?){}",
        regex::escape(PROPOSAL_START_MARKER),
        regex::escape(PROPOSAL_END_MARKER)
    ))
});

/// The first `<proposal>…</proposal>` block in `text`, parsed.
/// `Ok(None)` when there is no block; malformed JSON inside one is an error.
pub fn extract_proposal(text: &str) -> EngineResult<Option<Proposal>> {
    let re = PROPOSAL_BLOCK
        .as_ref()
        .map_err(|e| EngineError::Other(format!("proposal pattern: {}", e)))?;
    let Some(caps) = re.captures(text) else {
        return Ok(None);
    };
    let body = caps.get(1).map(|m| m.as_str()).unwrap_or("");
    let body = strip_code_fence(body.trim());
    let proposal: Proposal = serde_json::from_str(body)?;
    Ok(Some(proposal))
}

/// Models like to wrap JSON in ```json fences even inside the markers.
fn strip_code_fence(body: &str) -> &str {
    let Some(rest) = body.strip_prefix("```") else {
        return body;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// `text` with every proposal block removed, for display.
pub fn strip_proposals(text: &str) -> String {
    match PROPOSAL_BLOCK.as_ref() {
        Ok(re) => re.replace_all(text, "").trim().to_string(),
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_block_is_none() {
        assert!(extract_proposal("just chatting").unwrap().is_none());
        assert!(extract_proposal("<proposal> unterminated").unwrap().is_none());
    }

    #[test]
    fn block_is_parsed() {
        let text = "Sure thing.\n<proposal>\n{\"reinforce\": [\"01ABC\"]}\n</proposal>\nBye";
        let p = extract_proposal(text).unwrap().unwrap();
        assert_eq!(p.reinforce, vec!["01ABC".to_string()]);
        assert!(p.add.is_empty());
        assert_eq!(strip_proposals(text), "Sure thing.\n\nBye");
    }

    #[test]
    fn fenced_json_is_accepted() {
        let text = "<proposal>```json\n{\"add\": [{\"premise\": \"x\", \"nodeType\": \"goal\"}]}\n```</proposal>";
        let p = extract_proposal(text).unwrap().unwrap();
        assert_eq!(p.add.len(), 1);
        assert_eq!(p.add[0].node_type, "goal");
    }

    #[test]
    fn malformed_json_is_an_error() {
        let err = extract_proposal("<proposal>{not json</proposal>").unwrap_err();
        assert!(matches!(err, EngineError::Serialization(_)));
    }
}
