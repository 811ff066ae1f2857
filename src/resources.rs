//! The resource catalogue: one static schema per collection.

use crate::schema::{
    CREATED_AT, Dependent, Fallback, FieldSpec as F, Filter, Lookup, ResourceSpec, Sort,
    Visibility, Workflow,
};

const PUBLICATION: &[&str] = &["draft", "published"];
const DRAFT: Fallback = Fallback::Text("draft");
const ZERO: Fallback = Fallback::Integer(0);
const ON: Fallback = Fallback::Flag(true);
const OFF: Fallback = Fallback::Flag(false);

const BY_DISPLAY_ORDER: &[Sort] = &[Sort::asc("displayOrder"), Sort::asc(CREATED_AT)];
const FEATURED_FIRST: &[Sort] = &[
    Sort::desc("featured"),
    Sort::asc("displayOrder"),
    Sort::desc(CREATED_AT),
];
const NEWEST_FIRST: &[Sort] = &[Sort::desc(CREATED_AT)];

// Projects

static PROJECT_FIELDS: &[F] = &[
    F::text("title", "title", 2).required(),
    F::text("titleAr", "title_ar", 0),
    F::slug("slug", "slug").required(),
    F::text("description", "description", 10).required(),
    F::text("descriptionAr", "description_ar", 0),
    F::choice("category", "category", &["Web", "SaaS", "Mobile"]).required(),
    F::list("technologies", "technologies").at_least(1).required(),
    F::text("clientName", "client_name", 0),
    F::timestamp("completionDate", "completion_date"),
    F::flag("featured", "featured").or(OFF),
    F::list("images", "images"),
    F::url("caseStudyUrl", "case_study_url"),
    F::url("liveUrl", "live_url"),
    F::url("githubUrl", "github_url"),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::choice("status", "status", PUBLICATION).or(DRAFT),
    F::integer("views", "views").read_only().or(ZERO),
];

pub static PROJECTS: ResourceSpec = ResourceSpec::new("portfolio", "projects", "Project", PROJECT_FIELDS)
    .lookup(Lookup::Key("slug"))
    .unique(&["slug"])
    .visibility(Visibility::Status {
        field: "status",
        public: "published",
    })
    .order(FEATURED_FIRST)
    .filters(&[Filter::on("category", "category"), Filter::on("featured", "featured")])
    .limit(20)
    .counts_views("views");

// Services

static SERVICE_FIELDS: &[F] = &[
    F::text("title", "title", 2).required(),
    F::text("titleAr", "title_ar", 0),
    F::slug("slug", "slug").required(),
    F::text("shortDescription", "short_description", 10).required(),
    F::text("shortDescAr", "short_desc_ar", 0),
    F::text("fullDescription", "full_description", 0),
    F::text("fullDescAr", "full_desc_ar", 0),
    F::text("icon", "icon", 0),
    F::list("features", "features"),
    F::list("featuresAr", "features_ar"),
    F::decimal("pricingFrom", "pricing_from"),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::flag("isActive", "is_active").or(ON),
];

pub static SERVICES: ResourceSpec = ResourceSpec::new("services", "services", "Service", SERVICE_FIELDS)
    .lookup(Lookup::Key("slug"))
    .unique(&["slug"])
    .visibility(Visibility::Flag {
        field: "isActive",
        param: "active",
    })
    .order(BY_DISPLAY_ORDER);

// Testimonials

static TESTIMONIAL_FIELDS: &[F] = &[
    F::text("quote", "quote", 10).required(),
    F::text("quoteAr", "quote_ar", 0),
    F::text("authorName", "author_name", 2).required(),
    F::text("authorRole", "author_role", 0),
    F::text("authorRoleAr", "author_role_ar", 0),
    F::text("authorCompany", "author_company", 0),
    F::text("authorImage", "author_image", 0),
    F::ranged("rating", "rating", 1, 5),
    F::flag("featured", "featured").or(OFF),
    F::flag("approved", "approved").or(OFF),
    F::integer("displayOrder", "display_order").or(ZERO),
];

pub static TESTIMONIALS: ResourceSpec =
    ResourceSpec::new("testimonials", "testimonials", "Testimonial", TESTIMONIAL_FIELDS)
        .visibility(Visibility::Flag {
            field: "approved",
            param: "approved",
        })
        .order(FEATURED_FIRST)
        .filters(&[Filter::on("featured", "featured")]);

// Team

static TEAM_FIELDS: &[F] = &[
    F::text("name", "name", 2).required(),
    F::text("nameAr", "name_ar", 0),
    F::text("role", "role", 2).required(),
    F::text("roleAr", "role_ar", 0),
    F::text("bio", "bio", 0),
    F::text("bioAr", "bio_ar", 0),
    F::text("image", "image", 0),
    F::url("linkedin", "linkedin"),
    F::url("twitter", "twitter"),
    F::url("github", "github"),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::flag("isActive", "is_active").or(ON),
];

pub static TEAM: ResourceSpec = ResourceSpec::new("team", "team_members", "Team member", TEAM_FIELDS)
    .visibility(Visibility::Flag {
        field: "isActive",
        param: "active",
    })
    .order(BY_DISPLAY_ORDER);

// Pages

static PAGE_FIELDS: &[F] = &[
    F::text("title", "title", 2).required(),
    F::text("titleAr", "title_ar", 0),
    F::slug("slug", "slug").required(),
    F::text("content", "content", 0),
    F::text("contentAr", "content_ar", 0),
    F::text("metaTitle", "meta_title", 0),
    F::text("metaTitleAr", "meta_title_ar", 0),
    F::text("metaDesc", "meta_desc", 0),
    F::text("metaDescAr", "meta_desc_ar", 0),
    F::text("template", "template", 0).or(Fallback::Text("default")),
    F::choice("status", "status", PUBLICATION).or(DRAFT),
    F::integer("displayOrder", "display_order").or(ZERO),
];

pub static PAGES: ResourceSpec = ResourceSpec::new("pages", "pages", "Page", PAGE_FIELDS)
    .lookup(Lookup::KeyOrId("slug"))
    .unique(&["slug"])
    .visibility(Visibility::Status {
        field: "status",
        public: "published",
    })
    .order(BY_DISPLAY_ORDER);

// Blog

static BLOG_FIELDS: &[F] = &[
    F::text("title", "title", 2).required(),
    F::text("titleAr", "title_ar", 0),
    F::slug("slug", "slug").required(),
    F::text("excerpt", "excerpt", 0),
    F::text("excerptAr", "excerpt_ar", 0),
    F::text("content", "content", 50).required(),
    F::text("contentAr", "content_ar", 0),
    F::text("coverImage", "cover_image", 0),
    F::text("category", "category", 0),
    F::list("tags", "tags"),
    F::choice("status", "status", PUBLICATION).or(DRAFT),
    F::timestamp("publishedAt", "published_at"),
];

pub static BLOG: ResourceSpec = ResourceSpec::new("blog", "blog_posts", "Blog post", BLOG_FIELDS)
    .lookup(Lookup::Key("slug"))
    .unique(&["slug"])
    .visibility(Visibility::Status {
        field: "status",
        public: "published",
    })
    .order(NEWEST_FIRST)
    .filters(&[Filter::on("category", "category")])
    .limit(20);

// Menus

static MENU_FIELDS: &[F] = &[
    F::text("name", "name", 2).required(),
    F::text("nameAr", "name_ar", 0),
    F::slug("location", "location").required(),
    F::flag("isActive", "is_active").or(ON),
];

static MENU_DEPENDENTS: &[Dependent] = &[Dependent {
    collection: &MENU_ITEMS,
    field: "menuId",
}];

pub static MENUS: ResourceSpec = ResourceSpec::new("menus", "menus", "Menu", MENU_FIELDS)
    .lookup(Lookup::KeyOrId("location"))
    .unique(&["location"])
    .visibility(Visibility::Flag {
        field: "isActive",
        param: "active",
    })
    .order(&[Sort::asc(CREATED_AT)])
    .filters(&[Filter::on("location", "location")])
    .dependents(MENU_DEPENDENTS);

static MENU_ITEM_FIELDS: &[F] = &[
    F::reference("menuId", "menu_id", &MENUS).required(),
    F::reference("parentId", "parent_id", &MENU_ITEMS),
    F::text("label", "label", 1).required(),
    F::text("labelAr", "label_ar", 0),
    F::text("url", "url", 0),
    F::reference("pageId", "page_id", &PAGES),
    F::choice("target", "target", &["_self", "_blank"]).or(Fallback::Text("_self")),
    F::text("icon", "icon", 0),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::flag("isActive", "is_active").or(ON),
];

static MENU_ITEM_DEPENDENTS: &[Dependent] = &[Dependent {
    collection: &MENU_ITEMS,
    field: "parentId",
}];

pub static MENU_ITEMS: ResourceSpec =
    ResourceSpec::new("menu-items", "menu_items", "Menu item", MENU_ITEM_FIELDS)
        .visibility(Visibility::Flag {
            field: "isActive",
            param: "active",
        })
        .order(BY_DISPLAY_ORDER)
        .filters(&[Filter::on("menuId", "menuId"), Filter::on("parentId", "parentId")])
        .limit(100)
        .tree("parentId")
        .dependents(MENU_ITEM_DEPENDENTS);

// Categories

static CATEGORY_FIELDS: &[F] = &[
    F::text("name", "name", 2).required(),
    F::text("nameAr", "name_ar", 0),
    F::slug("slug", "slug").required(),
    F::text("description", "description", 0),
    F::text("descriptionAr", "description_ar", 0),
    F::text("type", "type", 2).required(),
    F::reference("parentId", "parent_id", &CATEGORIES),
    F::text("icon", "icon", 0),
    F::text("color", "color", 0),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::flag("isActive", "is_active").or(ON),
];

static CATEGORY_DEPENDENTS: &[Dependent] = &[
    Dependent {
        collection: &CATEGORIES,
        field: "parentId",
    },
    Dependent {
        collection: &FAQ,
        field: "categoryId",
    },
];

pub static CATEGORIES: ResourceSpec =
    ResourceSpec::new("categories", "categories", "Category", CATEGORY_FIELDS)
        .lookup(Lookup::KeyOrId("slug"))
        .unique(&["slug"])
        .visibility(Visibility::Flag {
            field: "isActive",
            param: "active",
        })
        .order(BY_DISPLAY_ORDER)
        .filters(&[Filter::on("type", "type"), Filter::on("parentId", "parentId")])
        .limit(100)
        .tree("parentId")
        .dependents(CATEGORY_DEPENDENTS);

// FAQ

static FAQ_FIELDS: &[F] = &[
    F::text("question", "question", 5).required(),
    F::text("questionAr", "question_ar", 0),
    F::text("answer", "answer", 10).required(),
    F::text("answerAr", "answer_ar", 0),
    F::reference("categoryId", "category_id", &CATEGORIES),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::flag("isActive", "is_active").or(ON),
];

pub static FAQ: ResourceSpec = ResourceSpec::new("faq", "faqs", "FAQ", FAQ_FIELDS)
    .visibility(Visibility::Flag {
        field: "isActive",
        param: "active",
    })
    .order(BY_DISPLAY_ORDER)
    .filters(&[Filter::on("categoryId", "categoryId")])
    .limit(100);

// Partners

static PARTNER_FIELDS: &[F] = &[
    F::text("name", "name", 2).required(),
    F::text("nameAr", "name_ar", 0),
    F::text("logo", "logo", 0),
    F::url("website", "website"),
    F::text("description", "description", 0),
    F::text("descriptionAr", "description_ar", 0),
    F::text("type", "type", 0).or(Fallback::Text("client")),
    F::flag("featured", "featured").or(OFF),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::flag("isActive", "is_active").or(ON),
];

pub static PARTNERS: ResourceSpec = ResourceSpec::new("partners", "partners", "Partner", PARTNER_FIELDS)
    .visibility(Visibility::Flag {
        field: "isActive",
        param: "active",
    })
    .order(BY_DISPLAY_ORDER)
    .filters(&[Filter::on("type", "type"), Filter::on("featured", "featured")]);

// Pricing

static PRICING_FIELDS: &[F] = &[
    F::text("name", "name", 2).required(),
    F::text("nameAr", "name_ar", 0),
    F::text("description", "description", 0),
    F::text("descriptionAr", "description_ar", 0),
    F::decimal("price", "price").required(),
    F::text("currency", "currency", 3).or(Fallback::Text("USD")),
    F::choice("period", "period", &["monthly", "yearly", "one-time"])
        .or(Fallback::Text("monthly")),
    F::list("features", "features").or(Fallback::EmptyList),
    F::list("featuresAr", "features_ar"),
    F::flag("highlighted", "highlighted").or(OFF),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::flag("isActive", "is_active").or(ON),
];

pub static PRICING: ResourceSpec = ResourceSpec::new("pricing", "pricing_plans", "Pricing plan", PRICING_FIELDS)
    .visibility(Visibility::Flag {
        field: "isActive",
        param: "active",
    })
    .order(BY_DISPLAY_ORDER);

// Social links

static SOCIAL_LINK_FIELDS: &[F] = &[
    F::text("platform", "platform", 2).required(),
    F::url("url", "url").required(),
    F::text("icon", "icon", 0),
    F::integer("displayOrder", "display_order").or(ZERO),
    F::flag("isActive", "is_active").or(ON),
];

pub static SOCIAL_LINKS: ResourceSpec =
    ResourceSpec::new("social-links", "social_links", "Social link", SOCIAL_LINK_FIELDS)
        .visibility(Visibility::Flag {
            field: "isActive",
            param: "active",
        })
        .order(BY_DISPLAY_ORDER);

// Orders

static ORDER_FIELDS: &[F] = &[
    F::text("orderNumber", "order_number", 3).required(),
    F::text("customerName", "customer_name", 2).required(),
    F::email("customerEmail", "customer_email").required(),
    F::reference("serviceId", "service_id", &SERVICES),
    F::decimal("amount", "amount").required(),
    F::text("currency", "currency", 3).or(Fallback::Text("USD")),
    F::choice(
        "status",
        "status",
        &["pending", "processing", "completed", "cancelled"],
    )
    .or(Fallback::Text("pending")),
    F::choice("paymentStatus", "payment_status", &["unpaid", "paid", "refunded"])
        .or(Fallback::Text("unpaid")),
    F::text("notes", "notes", 0),
];

pub static ORDERS: ResourceSpec = ResourceSpec::new("orders", "orders", "Order", ORDER_FIELDS)
    .lookup(Lookup::KeyOrId("orderNumber"))
    .unique(&["orderNumber"])
    .visibility(Visibility::AdminOnly)
    .filters(&[Filter::on("status", "status")])
    .limit(20);

// Public submissions

pub const CONTACT_STATUSES: &[&str] = &["new", "contacted", "qualified", "converted", "rejected"];

/// Contacts move forward through the pipeline one step at a time; any open
/// contact may be rejected. `converted` and `rejected` are final.
pub fn contact_transition_allowed(from: &str, to: &str) -> bool {
    if from == to {
        return true;
    }
    match (from, to) {
        ("converted" | "rejected", _) => false,
        (_, "rejected") => true,
        ("new", "contacted") | ("contacted", "qualified") | ("qualified", "converted") => true,
        _ => false,
    }
}

static CONTACT_FIELDS: &[F] = &[
    F::text("name", "name", 2).required(),
    F::email("email", "email").required(),
    F::text("phone", "phone", 0),
    F::choice("projectType", "project_type", &["web", "mobile", "uiux", "other"]).required(),
    F::text("budget", "budget", 0),
    F::text("message", "message", 10).required(),
    F::choice("status", "status", CONTACT_STATUSES)
        .update_only()
        .or(Fallback::Text("new")),
    F::text("notes", "notes", 0).update_only(),
    F::text("ipAddress", "ip_address", 0).read_only(),
    F::text("userAgent", "user_agent", 0).read_only(),
];

pub static CONTACTS: ResourceSpec = ResourceSpec::new("contact", "contacts", "Contact", CONTACT_FIELDS)
    .submission()
    .filters(&[Filter::on("status", "status")])
    .limit(10)
    .workflow(Workflow {
        field: "status",
        allows: contact_transition_allowed,
    });

static SUBSCRIBER_FIELDS: &[F] = &[
    F::email("email", "email").required(),
    F::flag("isActive", "is_active").update_only().or(ON),
    F::timestamp("unsubscribedAt", "unsubscribed_at").read_only(),
    F::text("ipAddress", "ip_address", 0).read_only(),
    F::text("userAgent", "user_agent", 0).read_only(),
];

pub static SUBSCRIBERS: ResourceSpec =
    ResourceSpec::new("newsletter", "newsletter_subscribers", "Subscriber", SUBSCRIBER_FIELDS)
        .submission()
        .unique(&["email"])
        .filters(&[Filter::on("active", "isActive")]);

static QUIZ_FIELDS: &[F] = &[
    F::choice("quizType", "quiz_type", &["business", "developer"]).required(),
    F::integer("score", "score").required(),
    F::list("answers", "answers").required(),
    F::text("result", "result", 0),
    F::email("userEmail", "user_email"),
    F::text("ipAddress", "ip_address", 0).read_only(),
    F::text("userAgent", "user_agent", 0).read_only(),
];

pub static QUIZ_RESULTS: ResourceSpec = ResourceSpec::new("quiz", "quiz_results", "Quiz result", QUIZ_FIELDS)
    .submission()
    .filters(&[Filter::on("type", "quizType")])
    .limit(100);

// Key/value collections

static SETTING_FIELDS: &[F] = &[
    F::text("key", "key", 1).required(),
    F::text("value", "value", 0),
    F::text("valueAr", "value_ar", 0),
    F::choice("type", "type", &["string", "number", "boolean", "json", "image"])
        .or(Fallback::Text("string")),
    F::text("group", "setting_group", 0).or(Fallback::Text("general")),
    F::text("label", "label", 0),
    F::text("labelAr", "label_ar", 0),
    F::text("description", "description", 0),
    F::flag("isPublic", "is_public").or(OFF),
];

pub static SETTINGS: ResourceSpec = ResourceSpec::new("settings", "settings", "Setting", SETTING_FIELDS)
    .lookup(Lookup::Key("key"))
    .unique(&["key"])
    .visibility(Visibility::Flag {
        field: "isPublic",
        param: "public",
    })
    .order(&[Sort::asc("key")])
    .filters(&[Filter::on("group", "group")])
    .limit(100);

static STAT_FIELDS: &[F] = &[
    F::text("key", "key", 1).required(),
    F::integer("value", "value").required(),
];

pub static STATS: ResourceSpec = ResourceSpec::new("stats", "site_stats", "Stat", STAT_FIELDS)
    .lookup(Lookup::Key("key"))
    .unique(&["key"])
    .order(&[Sort::asc("key")])
    .limit(100);

/// Collections served by the generic CRUD routes.
pub static CATALOGUE: &[&ResourceSpec] = &[
    &PROJECTS,
    &SERVICES,
    &TESTIMONIALS,
    &TEAM,
    &PAGES,
    &BLOG,
    &MENUS,
    &MENU_ITEMS,
    &CATEGORIES,
    &FAQ,
    &PARTNERS,
    &PRICING,
    &SOCIAL_LINKS,
    &ORDERS,
    &CONTACTS,
    &SUBSCRIBERS,
    &QUIZ_RESULTS,
];

/// Every table the store holds records for.
pub static ALL: &[&ResourceSpec] = &[
    &PROJECTS,
    &SERVICES,
    &TESTIMONIALS,
    &TEAM,
    &PAGES,
    &BLOG,
    &MENUS,
    &MENU_ITEMS,
    &CATEGORIES,
    &FAQ,
    &PARTNERS,
    &PRICING,
    &SOCIAL_LINKS,
    &ORDERS,
    &CONTACTS,
    &SUBSCRIBERS,
    &QUIZ_RESULTS,
    &SETTINGS,
    &STATS,
];

pub fn by_segment(segment: &str) -> Option<&'static ResourceSpec> {
    CATALOGUE.iter().copied().find(|spec| spec.segment == segment)
}
