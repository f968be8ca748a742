use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};
use unic_langid::LanguageIdentifier;

/// Locale used when a message is missing from the requested one.
pub const FALLBACK_LOCALE: &str = "pt-BR";

/// Internationalization service using Fluent (thread-safe)
pub struct I18n {
    bundles: RwLock<HashMap<String, FluentBundle<FluentResource>>>,
    default_locale: String,
}

impl I18n {
    /// Create a new i18n service with the embedded Portuguese and English translations
    pub fn new() -> Self {
        let i18n = Self {
            bundles: RwLock::new(HashMap::new()),
            default_locale: FALLBACK_LOCALE.to_string(),
        };

        i18n.load_embedded("pt-BR", PT_BR_TRANSLATIONS);
        i18n.load_embedded("en", EN_TRANSLATIONS);

        i18n
    }

    /// Add a locale with translations
    pub fn add_locale(&self, locale: &str, content: &str) -> Result<(), String> {
        let lang_id: LanguageIdentifier = locale
            .parse()
            .map_err(|e| format!("Invalid locale '{}': {}", locale, e))?;

        let resource = FluentResource::try_new(content.to_string())
            .map_err(|(_, errors)| format!("Failed to parse Fluent resource: {:?}", errors))?;

        let mut bundle = FluentBundle::new_concurrent(vec![lang_id]);
        // Messages end up in plain text and HTML, never in bidi-sensitive layouts
        bundle.set_use_isolating(false);
        bundle
            .add_resource(resource)
            .map_err(|errors| format!("Failed to add resource to bundle: {:?}", errors))?;

        let mut bundles = self.bundles.write().unwrap_or_else(PoisonError::into_inner);
        bundles.insert(locale.to_string(), bundle);

        debug!(locale = %locale, "Loaded translations");

        Ok(())
    }

    /// Whether translations are loaded for a locale
    pub fn has_locale(&self, locale: &str) -> bool {
        self.bundles
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(locale)
    }

    /// Get a translated message
    pub fn get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> String {
        // Try requested locale, fall back to default, fall back to key
        self.try_get(locale, key, args)
            .or_else(|| self.try_get(&self.default_locale, key, args))
            .unwrap_or_else(|| key.to_string())
    }

    fn try_get(&self, locale: &str, key: &str, args: Option<&FluentArgs>) -> Option<String> {
        let bundles = self.bundles.read().unwrap_or_else(PoisonError::into_inner);
        let bundle = bundles.get(locale)?;
        let message = bundle.get_message(key)?;
        let pattern = message.value()?;

        let mut errors = vec![];
        let result = bundle.format_pattern(pattern, args, &mut errors);

        if !errors.is_empty() {
            warn!(key = %key, errors = ?errors, "Fluent formatting errors");
        }

        Some(result.to_string())
    }

    /// Get a translated message with arguments
    pub fn format(&self, locale: &str, key: &str, args: &[(&str, &str)]) -> String {
        let mut fluent_args = FluentArgs::new();
        for (k, v) in args {
            fluent_args.set(*k, *v);
        }
        self.get(locale, key, Some(&fluent_args))
    }

    fn load_embedded(&self, locale: &str, content: &str) {
        if let Err(e) = self.add_locale(locale, content) {
            warn!(locale = %locale, error = %e, "Failed to load embedded translations");
        }
    }
}

impl Default for I18n {
    fn default() -> Self {
        Self::new()
    }
}

const PT_BR_TRANSLATIONS: &str = r#"
app-title = Contador de Histórias
app-version = Versão { $version }

# Form
form-personalize = Personalizar
field-idea = Ideia principal (opcional)
field-idea-placeholder = ex.: 'um coelho que quer voar'
field-tone = Tom
field-duration = Duração
field-illustrate = Gerar ilustração

tone-random = Aleatório
tone-adventure = Aventura
tone-funny = Engraçada
tone-calm = Calma
tone-mysterious = Misteriosa

duration-short = ~2 min
duration-medium = ~4 min
duration-long = ~6 min

# Actions
action-generate = Gerar História
action-interrupt = Interromper geração
action-copy = Copiar história
action-new-session = Nova sessão
confirm-stop-message = Interromper a geração? Esta ação cancela o processo atual.
confirm-stop-yes = Sim, interromper agora
confirm-stop-no = Não, continuar

# Progress and notices
status-generating = Gerando...
status-stopping = Interrompendo...
notice-interrupted = Geração interrompida.
notice-completed = Concluído
notice-personalization-discarded = Não foi possível usar a sua ideia; criamos uma história original.
illustration-unavailable = Ilustração desativada ou não disponível: { $reason }

# Errors
error-story-empty = Não foi possível gerar a história.
error-idea-too-long = A ideia é longa demais (máximo de { $max } caracteres).
error-session-not-found = Sessão não encontrada: { $id }
error-illustration-not-found = Nenhuma ilustração disponível.
error-internal = Ocorreu um erro interno

# Health
health-status-healthy = Serviço funcionando
"#;

const EN_TRANSLATIONS: &str = r#"
app-title = Storyteller
app-version = Version { $version }

# Form
form-personalize = Personalize
field-idea = Main idea (optional)
field-idea-placeholder = e.g. 'a rabbit who wants to fly'
field-tone = Tone
field-duration = Length
field-illustrate = Generate illustration

tone-random = Random
tone-adventure = Adventure
tone-funny = Funny
tone-calm = Calm
tone-mysterious = Mysterious

duration-short = ~2 min
duration-medium = ~4 min
duration-long = ~6 min

# Actions
action-generate = Generate Story
action-interrupt = Stop generation
action-copy = Copy story
action-new-session = New session
confirm-stop-message = Stop the generation? This cancels the current run.
confirm-stop-yes = Yes, stop now
confirm-stop-no = No, keep going

# Progress and notices
status-generating = Generating...
status-stopping = Stopping...
notice-interrupted = Generation interrupted.
notice-completed = Done
notice-personalization-discarded = Your idea could not be used; we wrote an original story instead.
illustration-unavailable = Illustration disabled or unavailable: { $reason }

# Errors
error-story-empty = The story could not be generated.
error-idea-too-long = The idea is too long ({ $max } characters at most).
error-session-not-found = Session not found: { $id }
error-illustration-not-found = No illustration available.
error-internal = An internal error occurred

# Health
health-status-healthy = Service is healthy
"#;
