//! Resource identifier minting.
//!
//! Server-minted ids follow `urn:ngsi-ld:<kebab(resourceName)>:<uuid>`.

/// Converts a lowerCamelCase resource name into kebab-case.
///
/// Inserts `-` at every lowercase→uppercase boundary, then lowercases the
/// whole string. `productOffering` -> `product-offering`.
pub fn kebab_case(resource_name: &str) -> String {
    let mut out = String::with_capacity(resource_name.len() + 4);
    let mut prev_lower = false;
    for c in resource_name.chars() {
        if c.is_uppercase() && prev_lower {
            out.push('-');
        }
        out.extend(c.to_lowercase());
        prev_lower = c.is_lowercase();
    }
    out
}

/// Mints a fresh server-side id for a newly created resource.
pub fn mint_id(resource_name: &str) -> String {
    format!(
        "urn:ngsi-ld:{}:{}",
        kebab_case(resource_name),
        uuid::Uuid::new_v4()
    )
}

/// Mints the id of the auto-provisioned organization record for a DID.
pub fn organization_id(did: &str) -> String {
    format!("urn:ngsi-ld:organization:{did}")
}
