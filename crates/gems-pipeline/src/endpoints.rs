use gems_core::SubmissionKind;

/// How the create call's reply proves success.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Confirmation {
    /// 2xx with a JSON body.
    HttpSuccess,
    /// Body `status` must be 200.
    StatusField,
}

/// Shape of the URL field in the create body.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UrlShape {
    /// One string, or `null` when no image was attached.
    Single,
    List,
}

/// Server routes and field names for one submission kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Endpoint {
    pub domain: &'static str,
    pub create_path: &'static str,
    pub image_field: &'static str,
    pub url_field: &'static str,
    pub url_shape: UrlShape,
    pub confirmation: Confirmation,
}

pub fn endpoint(kind: SubmissionKind) -> Endpoint {
    match kind {
        SubmissionKind::Restaurant => Endpoint {
            domain: "resto",
            create_path: "add",
            image_field: "image",
            url_field: "fotoRestoran",
            url_shape: UrlShape::Single,
            confirmation: Confirmation::HttpSuccess,
        },
        SubmissionKind::Dish => Endpoint {
            domain: "kuliner",
            create_path: "add",
            image_field: "image",
            url_field: "fotoMakanan",
            url_shape: UrlShape::Single,
            confirmation: Confirmation::HttpSuccess,
        },
        SubmissionKind::Review => Endpoint {
            domain: "review",
            create_path: "add",
            image_field: "images",
            url_field: "imageUrls",
            url_shape: UrlShape::List,
            confirmation: Confirmation::StatusField,
        },
        SubmissionKind::Post => Endpoint {
            domain: "community",
            create_path: "create",
            image_field: "images",
            url_field: "imageUrls",
            url_shape: UrlShape::List,
            confirmation: Confirmation::StatusField,
        },
    }
}

impl Endpoint {
    pub fn upload_url(&self, base: &str) -> String {
        format!("{}/{}/upload", base, self.domain)
    }

    /// Public location of a file the upload route stored under `filename`.
    pub fn uploads_url(&self, base: &str, filename: &str) -> String {
        format!("{}/{}/uploads/{}", base, self.domain, filename.trim_start_matches('/'))
    }

    pub fn create_url(&self, base: &str) -> String {
        format!("{}/{}/{}", base, self.domain, self.create_path)
    }
}
