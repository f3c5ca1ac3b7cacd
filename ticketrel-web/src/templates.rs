use tera::Tera;

pub const TICKET: &str = "ticket.html";
pub const MANAGE: &str = "manage_ticket_relations.html";
pub const FRAGMENT: &str = "ticket_relations_fragment.html";

/// Page templates, compiled into the binary
const TEMPLATES: [(&str, &str); 5] = [
    ("layout.html", include_str!("../templates/layout.html")),
    ("relation_list.html", include_str!("../templates/relation_list.html")),
    (TICKET, include_str!("../templates/ticket.html")),
    (FRAGMENT, include_str!("../templates/ticket_relations_fragment.html")),
    (MANAGE, include_str!("../templates/manage_ticket_relations.html")),
];

pub fn load() -> tera::Result<Tera> {
    let mut tera = Tera::default();
    tera.add_raw_templates(TEMPLATES)?;
    tera.autoescape_on(vec![".html"]);
    Ok(tera)
}
