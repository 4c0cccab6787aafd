// Mirrors the tables owned by the classroom backend. This crate only reads them.

diesel::table! {
    activities (id) {
        id -> Text,
        class_id -> Text,
        name -> Text,
        created_at -> Timestamp,
    }
}

diesel::table! {
    activity_points (id) {
        id -> Text,
        activity_id -> Text,
        student_id -> Text,
        points -> Integer,
    }
}

diesel::table! {
    students (id) {
        id -> Text,
        class_id -> Text,
        first_name -> Text,
        last_name -> Text,
    }
}

diesel::joinable!(activity_points -> activities (activity_id));
diesel::joinable!(activity_points -> students (student_id));

diesel::allow_tables_to_appear_in_same_query!(activities, activity_points, students,);
