//! Reserved attribute and uniform names shared by the default shaders and the
//! primitive dispatcher. User shaders reference these to receive vertex data
//! and pipeline state.

pub const POS: &str = "al_pos";
pub const COLOR: &str = "al_color";
pub const TEXCOORD: &str = "al_texcoord";
pub const PROJVIEW_MATRIX: &str = "al_projview_matrix";
pub const TEX: &str = "al_tex";
pub const USE_TEX: &str = "al_use_tex";
pub const TEX_MATRIX: &str = "al_tex_matrix";
pub const USE_TEX_MATRIX: &str = "al_use_tex_matrix";
pub const ALPHA_TEST: &str = "al_alpha_test";
pub const ALPHA_FUNCTION: &str = "al_alpha_func";
pub const ALPHA_TEST_VALUE: &str = "al_alpha_test_val";
pub const USER_ATTR_PREFIX: &str = "al_user_attr_";

/// `al_user_attr_<n>`.
pub fn user_attr(n: u8) -> String {
    format!("{}{}", USER_ATTR_PREFIX, n)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn user_attributes() {
        assert_eq!(user_attr(0), "al_user_attr_0");
        assert_eq!(user_attr(9), "al_user_attr_9");
    }
}
