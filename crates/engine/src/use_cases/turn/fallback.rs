//! Scripted offline advisor.
//!
//! Used when neither the streamed nor the single-response completion
//! produced text, so a turn always ends with some advisor message.

use casesim_domain::ConversationHistory;

pub const OPENING_SCENARIO: &str = "Welcome, CEO. Your company 'TechFlow' is losing 10% revenue month-over-month due to a new competitor. You have $1M in the bank. Do you (A) Launch a marketing campaign or (B) Cut costs to survive?";

pub const MARKETING_BRANCH: &str = "You launched a marketing campaign ($200k). Revenue ticked up by 2%, but burn rate is high. The engineering team is complaining about old servers. Do you (A) Ignore them or (B) Invest in infrastructure?";

pub const DEFAULT_BRANCH: &str = "Interesting choice. The board is watching closely. A rival just poached your CTO. What is your immediate response?";

/// Deterministic next-message generator. Pure and total.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackSimulator;

impl FallbackSimulator {
    pub fn new() -> Self {
        Self
    }

    pub fn simulate(&self, history: &ConversationHistory) -> String {
        if history.is_empty() {
            return OPENING_SCENARIO.to_string();
        }

        let chose_marketing = history
            .last_user_message()
            .map(|m| {
                let decision = m.content.to_lowercase();
                decision.contains("marketing") || decision.trim() == "a"
            })
            .unwrap_or(false);

        if chose_marketing {
            MARKETING_BRANCH.to_string()
        } else {
            DEFAULT_BRANCH.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use casesim_domain::Message;

    fn single(content: &str) -> ConversationHistory {
        vec![Message::user(content)].into()
    }

    #[test]
    fn test_empty_history_opens_the_case() {
        let simulator = FallbackSimulator::new();
        let history = ConversationHistory::new();
        assert_eq!(simulator.simulate(&history), OPENING_SCENARIO);
        assert_eq!(simulator.simulate(&history), simulator.simulate(&history));
    }

    #[test]
    fn test_option_a_and_marketing_keyword_take_marketing_branch() {
        let simulator = FallbackSimulator::new();
        for input in ["A", "a", "  a  ", "marketing", "Let's do MARKETING now"] {
            assert_eq!(simulator.simulate(&single(input)), MARKETING_BRANCH, "input {:?}", input);
        }
    }

    #[test]
    fn test_other_decisions_take_default_branch() {
        let simulator = FallbackSimulator::new();
        for input in ["B", "Cut costs", "abandon ship", ""] {
            assert_eq!(simulator.simulate(&single(input)), DEFAULT_BRANCH, "input {:?}", input);
        }
    }

    #[test]
    fn test_inspects_most_recent_user_message() {
        let history: ConversationHistory = vec![
            Message::advisor(OPENING_SCENARIO),
            Message::user("B"),
            Message::advisor(DEFAULT_BRANCH),
            Message::user("Run a marketing blitz"),
        ]
        .into();
        assert_eq!(FallbackSimulator::new().simulate(&history), MARKETING_BRANCH);
    }

    #[test]
    fn test_history_without_user_message_takes_default_branch() {
        let history: ConversationHistory = vec![Message::advisor("marketing")].into();
        assert_eq!(FallbackSimulator::new().simulate(&history), DEFAULT_BRANCH);
    }
}
