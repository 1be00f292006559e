//! Canned answers used whenever the upstream cannot answer a question.
//!
//! Rules are checked in order against the lower-cased query and the first
//! rule with a matching substring wins.

/// Topic a canned answer covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Greeting,
    Team,
    Players,
    Tournaments,
    History,
    Training,
    Achievements,
    Fans,
    Organization,
    Future,
}

const GREETING: &str = "Olá! Tudo certo por aqui. Sou o assistente da nossa organização de esports. \
Pergunte sobre o time, os jogadores, os campeonatos ou a nossa história!";

const TEAM: &str = "Nosso time de CS2 é um dos mais fortes do cenário, com um estilo agressivo \
e muita comunicação. Acompanhe as próximas partidas na página de jogos!";

const PLAYERS: &str = "Nossa line-up atual reúne jogadores experientes e jovens talentos, \
comandados pelo nosso capitão e pela comissão técnica. Veja os perfis completos na página do elenco.";

const TOURNAMENTS: &str = "Estamos disputando os principais campeonatos da temporada. \
Confira o calendário completo e os próximos jogos na página de partidas!";

const HISTORY: &str = "A organização nasceu do sonho de levar o esports brasileiro ao topo do mundo \
e, desde a fundação, cresceu até competir nos maiores palcos internacionais.";

const TRAINING: &str = "A rotina de treinos inclui scrims diárias, revisão de demos, \
preparação física e acompanhamento psicológico, além de bootcamps antes dos grandes torneios.";

const ACHIEVEMENTS: &str = "Já conquistamos títulos nacionais e internacionais e chegamos a playoffs \
de Majors. Cada troféu é dividido com a nossa torcida!";

const FANS: &str = "A nossa torcida é a mais apaixonada do cenário! Participe dos quizzes, \
confira o ranking de fãs e mostre o seu apoio nas redes.";

const ORGANIZATION: &str = "Somos uma organização brasileira de esports com equipes em várias modalidades, \
conteúdo próprio e muito carinho pela comunidade.";

const FUTURE: &str = "Ainda não sei responder isso, mas estou aprendendo! Em breve teremos \
muitas novidades por aqui. Enquanto isso, pergunte sobre o time, os jogadores ou os campeonatos.";

const RULES: &[(Topic, &[&str])] = &[
    (
        Topic::Greeting,
        &["oi", "olá", "ola", "bom dia", "boa tarde", "boa noite", "tudo bem", "e aí", "eai"],
    ),
    (Topic::Team, &["time", "equipe", "squad"]),
    (Topic::Players, &["jogador", "player", "line-up", "lineup", "elenco"]),
    (
        Topic::Tournaments,
        &["torneio", "campeonato", "major", "partida", "próximo jogo", "proximo jogo"],
    ),
    (Topic::History, &["história", "historia", "fundação", "fundacao", "origem"]),
    (Topic::Training, &["treino", "treinamento", "bootcamp", "rotina"]),
    (Topic::Achievements, &["conquista", "título", "titulo", "troféu", "trofeu"]),
    (Topic::Fans, &["torcida", "torcedor", "fã", "fan"]),
    (Topic::Organization, &["organização", "organizacao", "sobre vocês", "sobre voces", "org"]),
];

/// Classify a query by the first matching keyword rule
pub fn topic_for(query: &str) -> Topic {
    let query = query.to_lowercase();
    RULES
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| query.contains(keyword)))
        .map(|(topic, _)| *topic)
        .unwrap_or(Topic::Future)
}

impl Topic {
    /// The canned answer for this topic
    pub fn message(self) -> &'static str {
        match self {
            Topic::Greeting => GREETING,
            Topic::Team => TEAM,
            Topic::Players => PLAYERS,
            Topic::Tournaments => TOURNAMENTS,
            Topic::History => HISTORY,
            Topic::Training => TRAINING,
            Topic::Achievements => ACHIEVEMENTS,
            Topic::Fans => FANS,
            Topic::Organization => ORGANIZATION,
            Topic::Future => FUTURE,
        }
    }
}

/// Deterministic canned answer for `query`
pub fn static_fallback_for(query: &str) -> &'static str {
    topic_for(query).message()
}
