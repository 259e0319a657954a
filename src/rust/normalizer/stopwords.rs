//! Stopword lists in the form they take after symbol stripping, so
//! contractions appear without apostrophes ("don't" -> "dont").

use super::Language;

const ENGLISH: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "youre",
    "youve", "youll", "youd", "your", "yours", "yourself", "yourselves", "he",
    "him", "his", "himself", "she", "shes", "her", "hers", "herself", "it", "its",
    "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "thatll", "these", "those", "am", "is", "are",
    "was", "were", "be", "been", "being", "have", "has", "had", "having", "do",
    "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or", "because",
    "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
    "between", "into", "through", "during", "before", "after", "above", "below",
    "to", "from", "up", "down", "in", "out", "on", "off", "over", "under", "again",
    "further", "then", "once", "here", "there", "when", "where", "why", "how",
    "all", "any", "both", "each", "few", "more", "most", "other", "some", "such",
    "no", "nor", "not", "only", "own", "same", "so", "than", "too", "very", "s",
    "t", "can", "will", "just", "don", "dont", "should", "shouldve", "now", "d",
    "ll", "m", "o", "re", "ve", "y", "ain", "aren", "arent", "couldn", "couldnt",
    "didn", "didnt", "doesn", "doesnt", "hadn", "hadnt", "hasn", "hasnt", "haven",
    "havent", "isn", "isnt", "ma", "mightn", "mightnt", "mustn", "mustnt",
    "needn", "neednt", "shan", "shant", "shouldn", "shouldnt", "wasn", "wasnt",
    "weren", "werent", "won", "wont", "wouldn", "wouldnt",
];

const PORTUGUESE: &[&str] = &[
    "de", "a", "o", "que", "e", "é", "do", "da", "em", "um", "para", "com", "não",
    "uma", "os", "no", "se", "na", "por", "mais", "as", "dos", "como", "mas", "ao",
    "ele", "das", "à", "seu", "sua", "ou", "quando", "muito", "nos", "já", "eu",
    "também", "só", "pelo", "pela", "até", "isso", "ela", "entre", "depois", "sem",
    "mesmo", "aos", "seus", "quem", "nas", "me", "esse", "eles", "você", "essa",
    "num", "nem", "suas", "meu", "às", "minha", "numa", "pelos", "elas", "qual",
    "nós", "lhe", "deles", "essas", "esses", "pelas", "este", "dele", "tu", "te",
    "vocês", "vos", "lhes", "meus", "minhas", "teu", "tua", "teus", "tuas",
    "nosso", "nossa", "nossos", "nossas", "dela", "delas", "esta", "estes",
    "estas", "aquele", "aquela", "aqueles", "aquelas", "isto", "aquilo", "estou",
    "está", "estamos", "estão", "estive", "esteve", "estivemos", "estiveram",
    "estava", "estávamos", "estavam", "estivera", "estivéramos", "esteja",
    "estejamos", "estejam", "estivesse", "estivéssemos", "estivessem", "estiver",
    "estivermos", "estiverem", "hei", "há", "havemos", "hão", "houve", "houvemos",
    "houveram", "houvera", "houvéramos", "haja", "hajamos", "hajam", "houvesse",
    "houvéssemos", "houvessem", "houver", "houvermos", "houverem", "houverei",
    "houverá", "houveremos", "houverão", "houveria", "houveríamos", "houveriam",
    "sou", "somos", "são", "era", "éramos", "eram", "fui", "foi", "fomos", "foram",
    "fora", "fôramos", "seja", "sejamos", "sejam", "fosse", "fôssemos", "fossem",
    "for", "formos", "forem", "serei", "será", "seremos", "serão", "seria",
    "seríamos", "seriam", "tenho", "tem", "temos", "tém", "tinha", "tínhamos",
    "tinham", "tive", "teve", "tivemos", "tiveram", "tivera", "tivéramos", "tenha",
    "tenhamos", "tenham", "tivesse", "tivéssemos", "tivessem", "tiver",
    "tivermos", "tiverem", "terei", "terá", "teremos", "terão", "teria",
    "teríamos", "teriam",
];

pub(crate) fn for_language(language: Language) -> &'static [&'static str] {
    match language {
        Language::English => ENGLISH,
        Language::Portuguese => PORTUGUESE,
    }
}
