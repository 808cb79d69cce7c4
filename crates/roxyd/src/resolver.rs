//! Intent Resolver - turns an utterance into an Interpretation.
//!
//! Sends the utterance and the instruction set to the classifier, parses the
//! JSON reply, optionally consults the knowledge service once, and falls back
//! to a small literal table when the classifier is unavailable or its reply
//! cannot be parsed. Never returns an error to the caller.

use regex::Regex;
use roxy_common::{
    is_useful_answer, Action, AmbiguityAnalysis, ClassifierClient, CommandType, ExecutionData,
    Interpretation, KnowledgeClient, RecentCommand,
};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::learning::InstructionAugmentation;

/// Base classifier instructions
pub const BASE_INSTRUCTIONS: &str = r#"Eres un detector de comandos para la asistente virtual Roxy.

REGLA PRINCIPAL: Responde SIEMPRE en formato JSON válido.

CATEGORÍAS:
1. "app" - Abrir/cerrar aplicaciones
2. "music" - Música, canciones, reproducción
3. "content" - Videos, anime, series, películas
4. "conversation" - Preguntas, charla normal

INFORMACIÓN EXTERNA:
Si el usuario menciona algo específico que no reconoces (anime, series, juegos, artistas poco conocidos),
usa "needs_additional_info": true y escribe la pregunta en "info_query".

EJEMPLOS DE RESPUESTA:

Input: "abre youtube"
{"category": "app", "action": "open_app", "target": "youtube", "confidence": 0.9, "execution_data": {"app_name": "youtube"}}

Input: "pon música de bad bunny"
{"category": "music", "action": "search_music", "target": "bad bunny", "confidence": 0.9, "execution_data": {"search_query": "bad bunny", "platform": "spotify"}}

Input: "pon el opening de dandadan"
{"category": "music", "action": "search_music", "target": "dandadan opening", "confidence": 0.7, "execution_data": {"search_query": "dandadan opening", "platform": "youtube"}, "needs_additional_info": true, "info_query": "¿Cuál es el nombre del opening de Dandadan?"}

Input: "inicia dj automático"
{"category": "music", "action": "start_auto_dj", "target": null, "confidence": 0.9, "execution_data": {"mood": "auto", "duration": 0}}

Input: "para el dj"
{"category": "music", "action": "stop_auto_dj", "target": null, "confidence": 0.9, "execution_data": {}}

Input: "¿cómo estás?"
{"category": "conversation", "action": "chat", "target": null, "confidence": 1.0, "execution_data": {}}

IMPORTANTE:
- SOLO responde con JSON válido
- NO agregues explicaciones
- Usa "spotify" para música conocida, "youtube" para música de anime/específica
- Usa "crunchyroll" para anime, "netflix" para series

RESPONDE SOLO JSON:"#;

const FINAL_LINE: &str = "RESPONDE SOLO JSON:";

/// Apps the fallback table opens without asking
const FALLBACK_APPS: &[&str] = &["youtube", "chrome", "spotify", "discord", "whatsapp"];

/// Artists the fallback table recognises anywhere in the utterance
const FALLBACK_ARTISTS: &[&str] = &["bad bunny", "fuerza regida", "peso pluma"];

/// Words marking an utterance as a question when knowledge was consulted
const QUESTION_WORDS: &[&str] = &[
    "sabes",
    "conoces",
    "algún",
    "algun",
    "qué",
    "que",
    "cuál",
    "cual",
    "recomienda",
    "recomiendame",
    "recomiéndame",
    "sugerencia",
    "puedes decirme",
];

/// Recent commands quoted to the classifier
const CONTEXT_COMMANDS: usize = 3;

// ============================================================================
// Instruction set
// ============================================================================

/// Base rules plus learned augmentation blocks
#[derive(Debug, Clone)]
pub struct InstructionSet {
    base: String,
    augmentation: InstructionAugmentation,
}

impl InstructionSet {
    pub fn new(base: &str) -> Self {
        Self {
            base: base.to_string(),
            augmentation: InstructionAugmentation::default(),
        }
    }

    /// Full instruction text sent to the classifier
    pub fn render(&self) -> String {
        format!("{}{}", self.base, self.augmentation.render())
    }

    pub fn version(&self) -> u64 {
        self.augmentation.version
    }

    pub fn augmentation(&self) -> &InstructionAugmentation {
        &self.augmentation
    }

    /// Replace the augmentation wholesale; true if the version changed
    pub fn set_augmentation(&mut self, augmentation: &InstructionAugmentation) -> bool {
        if augmentation.version == self.augmentation.version
            && augmentation.blocks.len() == self.augmentation.blocks.len()
        {
            return false;
        }
        self.augmentation = augmentation.clone();
        true
    }
}

impl Default for InstructionSet {
    fn default() -> Self {
        Self::new(BASE_INSTRUCTIONS)
    }
}

// ============================================================================
// Reply parsing
// ============================================================================

/// Classifier reply after normalisation
#[derive(Debug, Clone)]
pub struct ParsedReply {
    pub interpretation: Interpretation,
    /// Present when the classifier asked for an external lookup
    pub info_query: Option<String>,
}

/// Extract JSON from a reply (raw object, ```json fence, plain fence, or the
/// first `{` to the last `}`)
pub fn extract_json(reply: &str) -> Option<String> {
    let t = reply.trim();
    if t.starts_with('{') && t.ends_with('}') {
        return Some(t.to_string());
    }
    if let Some(s) = t.find("```json") {
        let body = &t[s + 7..];
        if let Some(e) = body.find("```") {
            let inner = body[..e].trim();
            if !inner.is_empty() {
                return Some(inner.to_string());
            }
        }
    }
    if let Some(s) = t.find("```") {
        let body = &t[s + 3..];
        if let Some(e) = body.find("```") {
            let inner = body[..e]
                .lines()
                .skip_while(|l| !l.trim().starts_with('{'))
                .collect::<Vec<_>>()
                .join("\n");
            if !inner.trim().is_empty() {
                return Some(inner);
            }
        }
    }
    match (t.find('{'), t.rfind('}')) {
        (Some(s), Some(e)) if s < e => Some(t[s..=e].to_string()),
        _ => None,
    }
}

fn first_of(value: Option<&Value>) -> Option<&Value> {
    match value {
        Some(Value::Array(items)) => items.first(),
        other => other,
    }
}

fn as_text(value: Option<&Value>) -> Option<String> {
    match value {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn as_confidence(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.8),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.8),
        _ => 0.8,
    }
}

/// Parse a classifier reply into an Interpretation.
/// Errors describe why the reply was unusable.
pub fn parse_reply(reply: &str, utterance: &str) -> Result<ParsedReply, String> {
    let json = extract_json(reply).ok_or_else(|| "No valid JSON found".to_string())?;
    let value: Value = serde_json::from_str(&json).map_err(|e| format!("Invalid JSON: {}", e))?;
    let root = value
        .as_object()
        .ok_or_else(|| "Reply is not a JSON object".to_string())?;

    // A category list holds either full command objects or bare names
    let mut fields: Map<String, Value> = root.clone();
    if let Some(Value::Array(items)) = root.get("category") {
        warn!("Multiple commands in reply, taking the first: {:?}", items);
        match items.first() {
            Some(Value::Object(obj)) => fields = obj.clone(),
            Some(first) => {
                fields.insert("category".to_string(), first.clone());
            }
            None => {
                fields.insert("category".to_string(), Value::from("conversation"));
                fields.insert("action".to_string(), Value::from("chat"));
            }
        }
    }

    let category_name = as_text(first_of(fields.get("category"))).unwrap_or_else(|| "conversation".to_string());
    let command_type = CommandType::from_str(&category_name).unwrap_or_else(|| {
        warn!("Unknown category '{}', treating as conversation", category_name);
        CommandType::Conversation
    });

    let action_name = as_text(first_of(fields.get("action"))).unwrap_or_else(|| "chat".to_string());
    if Action::is_synonym(&action_name) {
        debug!("Action synonym '{}' mapped to search_music", action_name);
    }
    let action = Action::from_str(&action_name).unwrap_or_else(|| {
        warn!("Unknown action '{}'", action_name);
        Action::Unknown
    });

    if let Some(Value::Array(items)) = fields.get("target") {
        warn!("Multiple targets in reply, taking the first: {:?}", items);
    }
    let target = as_text(first_of(fields.get("target"))).filter(|t| !t.trim().is_empty());

    let mut execution_data = ExecutionData::new();
    if let Some(Value::Object(obj)) = fields.get("execution_data") {
        for (k, v) in obj {
            execution_data.insert(k.clone(), v.clone());
        }
    }
    let has_query = execution_data
        .get("search_query")
        .and_then(|v| v.as_str())
        .map_or(false, |q| !q.is_empty());
    if !has_query {
        if let Some(t) = &target {
            execution_data.insert("search_query".to_string(), Value::from(t.clone()));
        }
    }

    let mut interpretation =
        Interpretation::new(command_type, action, target, as_confidence(fields.get("confidence")));
    interpretation.execution_data = execution_data;
    interpretation.natural_response =
        natural_response(command_type, action, interpretation.target.as_deref());
    interpretation.original_utterance = utterance.to_string();

    let wants_info = ["needs_additional_info", "needs_grok"]
        .iter()
        .any(|k| root.get(*k).and_then(|v| v.as_bool()).unwrap_or(false));
    let info_query = if wants_info {
        let query = ["info_query", "grok_query"]
            .iter()
            .find_map(|k| as_text(root.get(*k)))
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| utterance.to_string());
        Some(query)
    } else {
        None
    };

    Ok(ParsedReply {
        interpretation: interpretation.normalized(),
        info_query,
    })
}

/// Short acknowledgement for an interpretation
pub fn natural_response(command_type: CommandType, action: Action, target: Option<&str>) -> String {
    match (command_type, action, target) {
        (CommandType::App, Action::OpenApp, Some(t)) => format!("Abriendo {}...", t),
        (CommandType::App, Action::CloseApp, Some(t)) => format!("Cerrando {}...", t),
        (CommandType::Music, _, Some(t)) => format!("Buscando música: {}", t),
        (CommandType::Music, _, None) => "Iniciando reproducción de música...".to_string(),
        (CommandType::Content, _, Some(t)) => format!("Buscando contenido: {}", t),
        (CommandType::Content, _, None) => "Buscando contenido...".to_string(),
        _ => "Perfecto, entendido".to_string(),
    }
}

/// Literal patterns used when the classifier is unavailable
pub fn fallback(utterance: &str) -> Interpretation {
    warn!("Using fallback interpretation table");
    let lower = utterance.trim().to_lowercase();

    if let Some(rest) = lower.strip_prefix("abre ") {
        let app = rest.trim();
        if !app.is_empty() {
            if FALLBACK_APPS.contains(&app) {
                return Interpretation::new(CommandType::App, Action::OpenApp, Some(app.to_string()), 0.95)
                    .with_data("app_name", app)
                    .with_response(&format!("Abriendo {}...", app))
                    .with_utterance(utterance);
            }
            return Interpretation::conversation(
                0.8,
                "No reconozco esa aplicación, ¿puedes ser más específico?",
            )
            .with_utterance(utterance);
        }
    }

    if matches!(lower.as_str(), "pon" | "abre" | "pon de") {
        return Interpretation::conversation(0.9, "¿Qué te gustaría que ponga o abra?")
            .with_utterance(utterance);
    }

    if let Some(artist) = FALLBACK_ARTISTS.iter().find(|a| lower.contains(*a)) {
        return Interpretation::new(
            CommandType::Music,
            Action::SearchMusic,
            Some(artist.to_string()),
            0.9,
        )
        .with_data("search_query", *artist)
        .with_data("platform", "spotify")
        .with_response(&format!("Buscando música de {}", artist))
        .with_utterance(utterance);
    }

    if lower == "música" {
        return Interpretation::new(CommandType::Music, Action::SearchMusic, None, 0.8)
            .with_data("search_query", "música")
            .with_data("platform", "spotify")
            .with_response("Iniciando música...")
            .with_utterance(utterance);
    }

    Interpretation::conversation(0.7, "Entiendo, ¿en qué más puedo ayudarte?").with_utterance(utterance)
}

/// Pull a quoted title out of a knowledge answer ("se llama 'Otonoke'")
pub fn extract_query_from_answer(answer: &str) -> Option<String> {
    let patterns = [
        r#"(?i)opening.*?["']([^"']+)["']"#,
        r#"(?i)tema.*?["']([^"']+)["']"#,
        r#"(?i)canción.*?["']([^"']+)["']"#,
        r#"(?i)se llama ["']([^"']+)["']"#,
        r#"(?i)titulado ["']([^"']+)["']"#,
        r"(?i)opening:\s*([^\n\.]+)",
        r"(?i)título:\s*([^\n\.]+)",
    ];
    for pattern in patterns {
        let Ok(re) = Regex::new(pattern) else { continue };
        if let Some(m) = re.captures(answer).and_then(|c| c.get(1)) {
            let q = m.as_str().trim();
            if q.chars().count() > 3 {
                return Some(q.to_string());
            }
        }
    }
    None
}

fn reads_as_question(utterance: &str) -> bool {
    let lower = utterance.to_lowercase();
    QUESTION_WORDS.iter().any(|w| lower.contains(w))
}

// ============================================================================
// Resolver
// ============================================================================

/// Where an interpretation came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionSource {
    Classifier,
    /// Classifier unreachable; the fallback table answered
    Unavailable,
    /// Classifier replied with something unusable; the fallback table answered
    Unparsable { reason: String, reply: String },
}

impl ResolutionSource {
    pub fn fell_back(&self) -> bool {
        !matches!(self, Self::Classifier)
    }
}

/// An interpretation plus its provenance
#[derive(Debug, Clone)]
pub struct Resolution {
    pub interpretation: Interpretation,
    pub source: ResolutionSource,
}

/// Classifier-backed resolver
pub struct IntentResolver {
    classifier: Arc<dyn ClassifierClient>,
    knowledge: Option<Arc<dyn KnowledgeClient>>,
    instructions: InstructionSet,
}

impl IntentResolver {
    pub fn new(classifier: Arc<dyn ClassifierClient>) -> Self {
        Self {
            classifier,
            knowledge: None,
            instructions: InstructionSet::default(),
        }
    }

    pub fn with_knowledge(mut self, knowledge: Arc<dyn KnowledgeClient>) -> Self {
        self.knowledge = Some(knowledge);
        self
    }

    pub fn instructions(&self) -> &InstructionSet {
        &self.instructions
    }

    /// Swap in new augmentation blocks; true when the text changed
    pub fn refresh_instructions(&mut self, augmentation: &InstructionAugmentation) -> bool {
        let changed = self.instructions.set_augmentation(augmentation);
        if changed {
            info!(
                "Instructions updated with learned improvements (v{})",
                self.instructions.version()
            );
        }
        changed
    }

    fn instructions_with_context(&self, recent: &[RecentCommand]) -> String {
        let mut text = self.instructions.render();
        let tail = &recent[recent.len().saturating_sub(CONTEXT_COMMANDS)..];
        if !tail.is_empty() {
            text.push_str("\n\nCOMANDOS RECIENTES:");
            for r in tail {
                text.push_str(&format!(
                    "\n- \"{}\" -> {} {}",
                    r.utterance,
                    r.action,
                    r.target.as_deref().unwrap_or("")
                ));
            }
        }
        text
    }

    /// Resolve one utterance
    pub fn resolve(&self, utterance: &str, recent: &[RecentCommand]) -> Interpretation {
        self.resolve_traced(utterance, recent).interpretation
    }

    /// Resolve one utterance and report whether the fallback table was used
    pub fn resolve_traced(&self, utterance: &str, recent: &[RecentCommand]) -> Resolution {
        let utterance = utterance.trim();
        if utterance.is_empty() {
            return Resolution {
                interpretation: Interpretation::conversation(0.9, "¿En qué puedo ayudarte?"),
                source: ResolutionSource::Classifier,
            };
        }

        let instructions = self.instructions_with_context(recent);
        let reply = match self.classifier.classify(&instructions, utterance) {
            Ok(r) => r,
            Err(e) => {
                warn!("Classifier unavailable: {}", e);
                return Resolution {
                    interpretation: fallback(utterance),
                    source: ResolutionSource::Unavailable,
                };
            }
        };

        let parsed = match parse_reply(&reply, utterance) {
            Ok(p) => p,
            Err(e) => {
                warn!("Classifier reply unusable ({}): {}", e, reply);
                return Resolution {
                    interpretation: fallback(utterance),
                    source: ResolutionSource::Unparsable { reason: e, reply },
                };
            }
        };

        info!(
            "Classifier decision: {} - {} ({:.2})",
            parsed.interpretation.command_type,
            parsed.interpretation.action,
            parsed.interpretation.confidence
        );

        let interpretation = match parsed.info_query {
            Some(query) => self.with_knowledge_lookup(utterance, parsed.interpretation, &query),
            None => parsed.interpretation,
        };
        Resolution {
            interpretation,
            source: ResolutionSource::Classifier,
        }
    }

    fn with_knowledge_lookup(
        &self,
        utterance: &str,
        original: Interpretation,
        query: &str,
    ) -> Interpretation {
        let Some(knowledge) = &self.knowledge else {
            debug!("Knowledge lookup requested but no knowledge client configured");
            return original;
        };

        let answer = match knowledge.lookup(query) {
            Ok(a) if is_useful_answer(&a) => a.trim().to_string(),
            Ok(_) => {
                warn!("Knowledge answer too short for '{}'", query);
                return original;
            }
            Err(e) => {
                warn!("Knowledge lookup failed: {}", e);
                return original;
            }
        };
        info!("Knowledge lookup answered '{}'", query);

        let prompt = format!(
            "Input original: {}\n\n\
             Información adicional: {}\n\n\
             ANÁLISIS DE INTENCIÓN:\n\
             - ¿Es una PREGUNTA?: {}\n\
             - Categoría original: {}\n\
             - Acción original: {}\n\n\
             REGLAS ESTRICTAS:\n\
             1. Si el usuario usa palabras como \"sabes\", \"conoces\", \"algún\", \"qué\", \"recomienda\" -> usar action: \"chat\" o \"recommend_content\"\n\
             2. Si es una PREGUNTA sobre recomendaciones -> category: \"content\", action: \"chat\"\n\
             3. NUNCA uses \"search_content\" para preguntas conversacionales\n\
             4. Solo usa \"search_content\" si el usuario dice \"busca\", \"encuentra\", \"abre\"\n\n\
             Re-analiza y mejora la respuesta JSON manteniendo la intención conversacional.",
            utterance,
            answer,
            if reads_as_question(utterance) { "SÍ" } else { "NO" },
            original.command_type,
            original.action,
        );
        let instructions = self.instructions.render().replace(
            FINAL_LINE,
            "Usa la información adicional para mejorar tu respuesta. RESPONDE SOLO JSON:",
        );

        match self.classifier.classify(&instructions, &prompt) {
            Ok(reply) => match parse_reply(&reply, utterance) {
                Ok(parsed) => {
                    let mut interp = parsed.interpretation;
                    if interp.action.is_conversational() {
                        interp.natural_response = answer;
                    }
                    interp.knowledge_used = true;
                    interp
                }
                Err(e) => {
                    warn!("Re-parse after lookup failed ({}), answering conversationally", e);
                    let mut interp = Interpretation::new(CommandType::Content, Action::Chat, None, 0.8)
                        .with_response(&answer)
                        .with_utterance(utterance);
                    interp.is_command = false;
                    interp.knowledge_used = true;
                    interp
                }
            },
            Err(e) => {
                warn!("Classifier unavailable after lookup: {}", e);
                let mut interp = original;
                interp.knowledge_used = true;
                if interp.action.is_conversational() {
                    interp.natural_response = answer.clone();
                }
                if interp.execution_data.contains_key("search_query") {
                    if let Some(q) = extract_query_from_answer(&answer) {
                        debug!("Search query refined from lookup: {}", q);
                        interp
                            .execution_data
                            .insert("search_query".to_string(), Value::from(q.clone()));
                        interp.target = Some(q);
                    }
                }
                interp
            }
        }
    }

    /// Settle an ambiguous utterance from the user's follow-up.
    ///
    /// `selection` is 1-based into the analysis alternatives.
    pub fn resolve_ambiguity(
        &self,
        reply: &str,
        analysis: &AmbiguityAnalysis,
        selection: Option<usize>,
    ) -> Interpretation {
        let alternatives = &analysis.alternative_interpretations;

        if let Some(n) = selection {
            if n >= 1 && n <= alternatives.len() {
                let mut chosen = alternatives[n - 1].clone();
                chosen.set_confidence(0.8);
                chosen.needs_clarification = false;
                chosen.natural_response = format!(
                    "Perfecto, ejecutando: {} - {}",
                    chosen.action,
                    chosen.target.as_deref().unwrap_or("")
                );
                info!("Ambiguity resolved by selection {}: {}", n, chosen.action);
                return chosen;
            }
        }

        let original = alternatives
            .first()
            .map(|a| a.original_utterance.clone())
            .unwrap_or_default();
        let signals: Vec<&str> = analysis.signals.iter().map(|s| s.description.as_str()).collect();
        let options: Vec<String> = alternatives
            .iter()
            .map(|a| format!("{} - {}", a.action, a.target.as_deref().unwrap_or("")))
            .collect();
        let context = format!(
            "Usuario original: {}\nAmbigüedad detectada: {}\nOpciones disponibles: {}\nRespuesta del usuario: {}",
            original,
            signals.join("; "),
            options.join("; "),
            reply
        );

        match self
            .classifier
            .classify(&self.instructions.render(), &context)
            .map_err(|e| e.to_string())
            .and_then(|r| parse_reply(&r, reply))
        {
            Ok(parsed) => {
                let mut interp = parsed.interpretation;
                interp.natural_response = format!("Entendido, {}", interp.natural_response);
                interp.needs_clarification = false;
                return interp;
            }
            Err(e) => warn!("Could not re-classify clarification: {}", e),
        }

        if let Some(best) = alternatives.first() {
            let mut interp = best.clone();
            interp.needs_clarification = false;
            interp.natural_response =
                "Usando la interpretación más probable de tu solicitud original.".to_string();
            return interp;
        }

        Interpretation::conversation(
            0.5,
            "No pude resolver la ambigüedad. ¿Puedes ser más específico sobre lo que quieres hacer?",
        )
        .with_utterance(reply)
    }
}
