//! Prompt templates. `{query}`, `{conselho}`, `{tipo_documento}`, `{topico}`
//! and `{history}` are substituted by `fill`.

use councildb_core::types::DocumentType;

pub const REWRITE_SYSTEM: &str = "Reescreva perguntas vagas em consultas claras para busca vetorial. \
Inclua tipo de documento (ata, resolução, pauta), órgão (CONSUNI, CEPE), datas, números e tema. \
Seja conciso (máximo 2 frases).";

pub const CONTEXT_ANALYSIS: &str = r#"Você é um especialista em documentos dos Conselhos Superiores.

Analise a seguinte pergunta e identifique:
1. Qual conselho está sendo referenciado (CONSUNI, CEPE, etc.)
2. Que tipo de documento contém a resposta (Regimento, Ata, Pauta, Resolução)
3. Qual o formato esperado da resposta

Pergunta: {query}

Histórico da conversa:
{history}

Responda em JSON:
{
    "conselho": "nome do conselho ou 'indefinido'",
    "tipo_documento": "regimento|ata|pauta|resolucao|indefinido",
    "topico": "descrição breve do tópico",
    "formato_esperado": "como a resposta deve ser estruturada"
}"#;

pub const HYPOTHESIS_GENERIC: &str = r#"Você é um assistente especializado em documentos dos Conselhos Superiores.

CONTEXTO DO DOMÍNIO:
- Documentos disponíveis: Regimentos, Atas, Pautas, Resoluções
- Conselhos: CONSUNI, CEPE, e outros
- Estrutura típica: Artigos, Parágrafos (§), Incisos, Alíneas
- Linguagem: Formal, técnica, jurídica

ANÁLISE DA PERGUNTA:
Pergunta do usuário: {query}
Conselho identificado: {conselho}
Tipo de documento: {tipo_documento}
Tópico: {topico}

HISTÓRICO DA CONVERSA:
{history}

TAREFA:
Gere uma resposta HIPOTÉTICA e REALISTA que provavelmente existe nos documentos,
em linguagem formal, com referências específicas (ex: "Art. 7º", "§1º", "Inciso II")
e mencionando o documento fonte.

Resposta hipotética:"#;

const HYPOTHESIS_BYLAW: &str = r#"Você está gerando uma resposta hipotética sobre um REGIMENTO.

Pergunta: {query}
Regimento: {conselho}

Estrutura típica de resposta sobre regimentos:
- "Conforme o Art. [número] do Regimento [nome]..."
- "O [órgão/conselho] [ação], conforme estabelecido no Art. [número]..."
- "De acordo com o §[número] do Art. [número]..."

Gere uma resposta hipotética seguindo esse padrão:"#;

const HYPOTHESIS_MINUTES: &str = r#"Você está gerando uma resposta hipotética sobre uma ATA.

Pergunta: {query}
Contexto: Ata de reunião do {conselho}

Estrutura típica de resposta sobre atas:
- "Na reunião de [data], foi deliberado..."
- "Conforme Ata da [tipo] Reunião [número], realizada em [data]..."
- "Os participantes presentes foram..."
- "Foi aprovado por [quórum]..."

Gere uma resposta hipotética seguindo esse padrão:"#;

const HYPOTHESIS_AGENDA: &str = r#"Você está gerando uma resposta hipotética sobre uma PAUTA.

Pergunta: {query}
Contexto: Pauta de reunião do {conselho}

Estrutura típica de resposta sobre pautas:
- "A próxima reunião está agendada para [data], às [hora]..."
- "Conforme Pauta da [tipo] Reunião, os itens a serem discutidos são..."
- "Item [número]: [descrição]..."

Gere uma resposta hipotética seguindo esse padrão:"#;

const HYPOTHESIS_RESOLUTION: &str = r#"Você está gerando uma resposta hipotética sobre uma RESOLUÇÃO.

Pergunta: {query}
Contexto: Resolução do {conselho}

Estrutura típica de resposta sobre resoluções:
- "A Resolução {conselho} nº [número]/[ano] estabelece..."
- "Conforme Art. [número] da Resolução..."
- "Fica aprovado/estabelecido..."

Gere uma resposta hipotética seguindo esse padrão:"#;

/// Tailored hypothesis template, if the document type has one.
pub fn hypothesis_template(doc_type: DocumentType) -> Option<&'static str> {
    match doc_type {
        DocumentType::Bylaw => Some(HYPOTHESIS_BYLAW),
        DocumentType::Minutes => Some(HYPOTHESIS_MINUTES),
        DocumentType::Agenda => Some(HYPOTHESIS_AGENDA),
        DocumentType::Resolution => Some(HYPOTHESIS_RESOLUTION),
        DocumentType::Other => None,
    }
}

pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    vars.iter().fold(template.to_string(), |acc, (k, v)| acc.replace(&format!("{{{k}}}"), v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fill_replaces_every_occurrence() {
        let out = fill(HYPOTHESIS_RESOLUTION, &[("query", "Q"), ("conselho", "CEPE")]);
        assert!(out.contains("Pergunta: Q"));
        assert!(out.contains("Resolução CEPE nº"));
        assert!(!out.contains("{conselho}"));
    }

    #[test]
    fn other_documents_use_the_generic_template() {
        assert!(hypothesis_template(DocumentType::Other).is_none());
        assert!(hypothesis_template(DocumentType::Minutes).is_some());
    }
}
