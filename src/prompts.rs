//! Prompt templates for card generation.
//!
//! Renders the request brief into provider-agnostic messages. Every
//! user-derived value is XML-escaped before it lands inside a tag.

use std::collections::BTreeMap;

use crate::answers::Lang;
use crate::gateway::Message;

// =============================================================================
// Brief
// =============================================================================

/// Everything the generator is told about one request.
#[derive(Debug, Clone, Default)]
pub struct RecommendationBrief {
    pub lang: Lang,
    pub k: usize,
    /// One line per answered question.
    pub answer_lines: Vec<String>,
    pub axis_profile: BTreeMap<String, f64>,
    pub binary_traits: Vec<String>,
    pub silent_drivers: Vec<String>,
    pub consensus: Vec<String>,
    pub intents: Vec<String>,
    /// Top ranked catalog ids, as direction only.
    pub ranked_hints: Vec<String>,
}

impl RecommendationBrief {
    fn profile_block(&self) -> String {
        let axes = self
            .axis_profile
            .iter()
            .map(|(k, v)| format!("{k}={v:+.2}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut lines = vec![format!("axes: {axes}")];
        let optional = [
            ("traits", &self.binary_traits),
            ("drivers", &self.silent_drivers),
            ("consensus", &self.consensus),
            ("intents", &self.intents),
            ("hints", &self.ranked_hints),
        ];
        for (name, values) in optional {
            if !values.is_empty() {
                lines.push(format!("{name}: {}", values.join(", ")));
            }
        }
        lines.join("\n")
    }
}

// =============================================================================
// Prompt templates
// =============================================================================

/// Rendered prompt ready for the provider.
#[derive(Debug, Clone)]
pub struct PromptInstance {
    pub template_slug: String,
    pub system: String,
    /// Earlier turns, replayed between the system and user messages.
    pub prior: Vec<Message>,
    pub user: String,
}

impl PromptInstance {
    pub fn to_messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.prior.len() + 2);
        messages.push(Message::system(&self.system));
        messages.extend(self.prior.iter().cloned());
        messages.push(Message::user(&self.user));
        messages
    }
}

/// Escape XML special characters to prevent prompt injection via tag breaking.
pub fn escape_xml_chars(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// A localized prompt template with placeholders.
#[derive(Debug, Clone, Copy)]
pub struct PromptTemplate {
    pub slug: &'static str,
    pub system_en: &'static str,
    pub system_ar: &'static str,
    pub user_en: &'static str,
    pub user_ar: &'static str,
}

impl PromptTemplate {
    fn parts(&self, lang: Lang) -> (&'static str, &'static str) {
        match lang {
            Lang::En => (self.system_en, self.user_en),
            Lang::Ar => (self.system_ar, self.user_ar),
        }
    }

    /// Render the first-round recommendation prompt.
    pub fn render(&self, brief: &RecommendationBrief) -> PromptInstance {
        let (system, user) = self.parts(brief.lang);
        let answers = brief
            .answer_lines
            .iter()
            .map(|l| format!("- {}", escape_xml_chars(l.trim())))
            .collect::<Vec<_>>()
            .join("\n");
        let user = user
            .replace("{k}", &brief.k.to_string())
            .replace("{profile}", &escape_xml_chars(&brief.profile_block()))
            .replace("{answers}", &answers);

        PromptInstance {
            template_slug: self.slug.to_string(),
            system: system.trim().to_string(),
            prior: Vec::new(),
            user: user.trim().to_string(),
        }
    }

    /// Render a follow-up turn asking to fix `violations` in `previous_output`.
    pub fn render_repair(&self, first: &PromptInstance, previous_output: &str, violations: &[String], lang: Lang) -> PromptInstance {
        let (_, user) = self.parts(lang);
        let listed = violations
            .iter()
            .map(|v| format!("- {}", escape_xml_chars(v)))
            .collect::<Vec<_>>()
            .join("\n");
        let mut prior = first.prior.clone();
        prior.push(Message::user(&first.user));
        prior.push(Message::assistant(previous_output));

        PromptInstance {
            template_slug: self.slug.to_string(),
            system: first.system.clone(),
            prior,
            user: user.replace("{violations}", &listed).trim().to_string(),
        }
    }
}

// =============================================================================
// Standard prompts
// =============================================================================

pub const RECOMMEND_PROMPT: PromptTemplate = PromptTemplate {
    slug: "recommend_v1",
    system_en: r#"You are a warm, human movement coach. You describe sport identities through how they feel, never through logistics.
Never mention time, minutes, cost, reps, sets, rounds or specific places. Never name the sport itself or any catalog id: describe an identity instead.
Output only valid JSON."#,
    system_ar: r#"أنت مدرّب حركة بنبرة إنسانية لطيفة. تصف الهويات الرياضية بما تشعر به، لا بالتفاصيل اللوجستية.
ممنوع ذكر الوقت أو الدقائق أو التكلفة أو العدّات أو الجولات أو المكان المباشر. لا تذكر اسم الرياضة أو أي معرف من الكتالوج: صف هوية بدلا من ذلك.
أعِد JSON فقط."#,
    user_en: r#"Create exactly {k} distinct sport identities for this person.
<profile>
{profile}
</profile>

<answers>
{answers}
</answers>

Each identity needs sensory language (breath, rhythm, balance, warmth, focus...), a win_condition and at least 3 core_skills.
Return {"recommendations":[{"sport_label":"...","what_it_looks_like":"...","inner_sensation":"...","why_you":"...","first_week":"...","progress_markers":["..."],"win_condition":"...","core_skills":["...","...","..."],"mode":"Solo/Team","variant_vr":"...","variant_no_vr":"...","difficulty":1}]}
json:"#,
    user_ar: r#"أنشئ {k} هويات رياضية مختلفة تماما لهذا الشخص.
<profile>
{profile}
</profile>

<answers>
{answers}
</answers>

كل هوية تحتاج لغة حسية (تنفس، إيقاع، توازن، دفء، تركيز...) وwin_condition و3 core_skills على الأقل.
أعِد {"recommendations":[{"sport_label":"...","what_it_looks_like":"...","inner_sensation":"...","why_you":"...","first_week":"...","progress_markers":["..."],"win_condition":"...","core_skills":["...","...","..."],"mode":"Solo/Team","variant_vr":"...","variant_no_vr":"...","difficulty":1}]}
json:"#,
};

pub const REPAIR_PROMPT: PromptTemplate = PromptTemplate {
    slug: "repair_v1",
    system_en: "",
    system_ar: "",
    user_en: r#"Your previous answer broke these rules:
<violations>
{violations}
</violations>
Rewrite every identity so none of them apply. Keep the same JSON shape. JSON only."#,
    user_ar: r#"إجابتك السابقة خالفت هذه القواعد:
<violations>
{violations}
</violations>
أعد صياغة كل هوية بحيث لا تنطبق أي منها. حافظ على نفس شكل JSON. JSON فقط."#,
};

pub const PROMPTS: &[PromptTemplate] = &[RECOMMEND_PROMPT, REPAIR_PROMPT];

pub fn prompt_by_slug(slug: &str) -> Option<PromptTemplate> {
    PROMPTS.iter().find(|t| t.slug == slug).copied()
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Role;

    fn brief() -> RecommendationBrief {
        RecommendationBrief {
            lang: Lang::En,
            k: 3,
            answer_lines: vec!["q1: I like quiet mornings".into()],
            axis_profile: [("calm_adrenaline".to_string(), 0.5)].into_iter().collect(),
            consensus: vec!["swimming".into()],
            ..RecommendationBrief::default()
        }
    }

    #[test]
    fn prompt_render() {
        let p = RECOMMEND_PROMPT.render(&brief());
        assert!(p.system.contains("coach"));
        assert!(p.user.contains("exactly 3"));
        assert!(p.user.contains("calm_adrenaline=+0.50"));
        assert!(p.user.contains("consensus: swimming"));
        assert!(!p.user.contains("intents:"));
        assert_eq!(p.to_messages().len(), 2);
    }

    #[test]
    fn arabic_prompt_is_localized() {
        let mut b = brief();
        b.lang = Lang::Ar;
        let p = RECOMMEND_PROMPT.render(&b);
        assert!(p.system.contains("JSON"));
        assert!(p.user.contains("هويات"));
    }

    #[test]
    fn repair_prompt_replays_previous_turns() {
        let first = RECOMMEND_PROMPT.render(&brief());
        let p = REPAIR_PROMPT.render_repair(&first, "{\"recommendations\":[]}", &["too_short: 10 < 220 chars".into()], Lang::En);
        let messages = p.to_messages();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2].role, Role::Assistant);
        assert!(messages[3].content.contains("too_short"));
    }

    #[test]
    fn prompt_lookup() {
        assert!(prompt_by_slug("recommend_v1").is_some());
        assert!(prompt_by_slug("nonexistent").is_none());
    }

    #[test]
    fn xml_escaping() {
        let mut b = brief();
        b.answer_lines = vec!["<script>alert('xss')</script>".into()];
        let p = RECOMMEND_PROMPT.render(&b);
        assert!(p.user.contains("&lt;script&gt;"));
        assert!(!p.user.contains("<script>"));
    }
}
